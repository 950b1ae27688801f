use bson::DateTime;
use objrepo::Database;
use objrepo::errors::DbError;
use objrepo::query::filters::{ALL, and, eq, gt, gte, in_, lt, lte, not, or, regex, text};
use objrepo::query::{FindOptions, Order};
use objrepo::repository::ObjectRepository;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Note {
    text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Employee {
    emp_id: i64,
    join_date: DateTime,
    address: String,
    employee_note: Note,
}

fn employee(id: i64) -> Employee {
    Employee {
        emp_id: id,
        join_date: DateTime::from_millis(1_600_000_000_000 + id * 86_400_000),
        address: format!("{id} Main Street"),
        employee_note: Note { text: format!("note-{id}") },
    }
}

fn staff(db: &Database) -> ObjectRepository<Employee> {
    let repo = db.repository::<Employee>("employees");
    let all: Vec<Employee> = (1..=10).map(employee).collect();
    repo.insert_many(&all).unwrap();
    repo
}

fn ids(list: &[Employee]) -> Vec<i64> {
    list.iter().map(|e| e.emp_id).collect()
}

#[test]
fn limit_one_returns_first_record() {
    let db = Database::new();
    let repo = staff(&db);
    let cur = repo.find_with_options(&FindOptions::limit(0, 1)).unwrap();
    assert_eq!(cur.size().unwrap(), 1);
    assert_eq!(cur.first_or_default().unwrap().unwrap().emp_id, 1);
}

#[test]
fn gt_excludes_the_minimum() {
    let db = Database::new();
    let repo = staff(&db);
    let min = repo.find_with_options(&FindOptions::sort("empId", Order::Asc)).unwrap();
    let min_id = min.first_or_default().unwrap().unwrap().emp_id;
    assert_eq!(min_id, 1);

    let cur = repo.find(&gt("empId", min_id)).unwrap();
    assert_eq!(cur.size().unwrap(), 9);
    assert!(!ids(&cur.to_list().unwrap()).contains(&1));

    let cur = repo.find(&gte("empId", min_id)).unwrap();
    assert_eq!(cur.size().unwrap(), 10);
    assert!(ids(&cur.to_list().unwrap()).contains(&1));
}

#[test]
fn lt_and_lte_against_the_maximum() {
    let db = Database::new();
    let repo = staff(&db);
    let max = repo.find_with_options(&FindOptions::sort("empId", Order::Desc)).unwrap();
    let max_id = max.first_or_default().unwrap().unwrap().emp_id;
    assert_eq!(max_id, 10);
    assert_eq!(repo.find(&lt("empId", max_id)).unwrap().size().unwrap(), 9);
    assert_eq!(repo.find(&lte("empId", max_id)).unwrap().size().unwrap(), 10);
}

#[test]
fn in_matches_listed_values() {
    let db = Database::new();
    let repo = staff(&db);
    assert_eq!(repo.find(&in_("empId", [10_i64, 9, 8])).unwrap().size().unwrap(), 3);
    assert_eq!(repo.find(&in_("empId", [9_i64, 8])).unwrap().size().unwrap(), 2);
    assert_eq!(repo.find(&in_("empId", Vec::<i64>::new())).unwrap().size().unwrap(), 0);
}

#[test]
fn text_on_nested_note() {
    let db = Database::new();
    let repo = staff(&db);
    let hits = repo.find(&text("employeeNote.text", "NOTE-3")).unwrap().to_list().unwrap();
    assert_eq!(ids(&hits), vec![3]);
}

#[test]
fn missing_id_yields_empty_cursor() {
    let db = Database::new();
    let repo = staff(&db);
    let cur = repo.find(&eq("empId", -1)).unwrap();
    assert_eq!(cur.size().unwrap(), 0);
    assert!(cur.first_or_default().unwrap().is_none());
    assert!(cur.to_list().unwrap().is_empty());
}

#[test]
fn comparators_on_an_absent_field_match_nothing() {
    let db = Database::new();
    let repo = staff(&db);
    for f in [eq("salary", 1), gt("salary", 1), lt("salary", 1), in_("salary", [1, 2])] {
        assert_eq!(repo.count(&f).unwrap(), 0, "{f}");
    }
    assert_eq!(repo.count(&not(eq("salary", 1))).unwrap(), 10);
}

#[test]
fn regex_dot_star_matches_every_string_field() {
    let db = Database::new();
    let repo = staff(&db);
    assert_eq!(repo.count(&regex("address", ".*")).unwrap(), 10);
    // numbers are not strings
    assert_eq!(repo.count(&regex("empId", ".*")).unwrap(), 0);
    assert_eq!(repo.count(&regex("address", "^1[0 ]")).unwrap(), 2);
}

#[test]
fn boolean_combinators() {
    let db = Database::new();
    let repo = staff(&db);
    assert_eq!(repo.count(&and([gt("empId", 2), lt("empId", 6)])).unwrap(), 3);
    assert_eq!(repo.count(&or([eq("empId", 1), eq("empId", 10), eq("empId", 99)])).unwrap(), 2);
    assert_eq!(repo.count(&not(and([gt("empId", 2), lt("empId", 6)]))).unwrap(), 7);
    assert_eq!(repo.count(&and(Vec::new())).unwrap(), 10);
    assert_eq!(repo.count(&or(Vec::new())).unwrap(), 0);
    assert_eq!(repo.count(&ALL).unwrap(), 10);
}

#[test]
fn datetime_comparisons() {
    let db = Database::new();
    let repo = staff(&db);
    let cutoff = employee(5).join_date;
    assert_eq!(repo.count(&lt("joinDate", cutoff)).unwrap(), 4);
    assert_eq!(repo.count(&gte("joinDate", cutoff)).unwrap(), 6);
}

#[test]
fn sort_then_page() {
    let db = Database::new();
    let repo = staff(&db);
    let opts = FindOptions::sort("empId", Order::Desc).with_limit(2, 3);
    let page = repo.find_with(&gt("empId", 1), &opts).unwrap().to_list().unwrap();
    assert_eq!(ids(&page), vec![8, 7, 6]);
    let tail = repo.find_with_options(&FindOptions::limit(8, 5)).unwrap();
    assert_eq!(ids(&tail.to_list().unwrap()), vec![9, 10]);
}

#[test]
fn caller_input_errors_fail_at_find() {
    let db = Database::new();
    let repo = staff(&db);
    assert!(matches!(repo.find(&regex("address", "(")), Err(DbError::InvalidRegex { .. })));
    assert!(matches!(repo.find(&eq("a..b", 1)), Err(DbError::InvalidFieldPath { .. })));
    assert!(matches!(repo.find(&eq("$", 1)), Err(DbError::InvalidFieldPath { .. })));
    assert!(matches!(repo.find(&gt("empId", bson::Bson::Null)), Err(DbError::InvalidQuery(_))));
    assert!(matches!(
        repo.find_with_options(&FindOptions::sort("salary", Order::Asc)),
        Err(DbError::UnknownSortField(_))
    ));
}

#[test]
fn equality_on_join_date_projects_back_to_the_record() {
    let db = Database::new();
    let repo = staff(&db);
    let first = repo.find_all().unwrap().first_or_default().unwrap().unwrap();
    let by_id = repo.find(&eq("empId", first.emp_id)).unwrap().project::<Employee>().first_or_default().unwrap();
    assert_eq!(by_id.as_ref(), Some(&first));
    let by_date = repo.find(&eq("joinDate", first.join_date)).unwrap();
    assert_eq!(by_date.size().unwrap(), 1);
    assert_eq!(by_date.project::<Employee>().first_or_default().unwrap(), Some(first));
}

#[test]
fn and_of_id_address_and_join_date() {
    let db = Database::new();
    let repo = staff(&db);
    let first = repo.find_all().unwrap().first_or_default().unwrap().unwrap();
    let f = and([
        eq("empId", first.emp_id),
        regex("address", &first.address),
        eq("joinDate", first.join_date),
    ]);
    assert_eq!(repo.find(&f).unwrap().first_or_default().unwrap(), Some(first));
}

#[test]
fn or_with_unmatched_regex_and_null_join_date() {
    let db = Database::new();
    let repo = staff(&db);
    let first = repo.find_all().unwrap().first_or_default().unwrap().unwrap();
    let f = or([eq("empId", first.emp_id), regex("address", "n/a"), eq("joinDate", bson::Bson::Null)]);
    let cur = repo.find(&f).unwrap();
    assert_eq!(cur.size().unwrap(), 1);
    assert_eq!(cur.first_or_default().unwrap(), Some(first));
}

#[test]
fn not_eq_skips_the_record() {
    let db = Database::new();
    let repo = staff(&db);
    let first = repo.find_all().unwrap().first_or_default().unwrap().unwrap();
    let other = repo.find(&not(eq("empId", first.emp_id))).unwrap().first_or_default().unwrap().unwrap();
    assert_ne!(other, first);
    assert_eq!(repo.count(&not(eq("empId", first.emp_id))).unwrap(), 9);
}

#[test]
fn emptied_repository_has_no_first_record() {
    let db = Database::new();
    let repo = staff(&db);
    assert_eq!(repo.remove(&ALL).unwrap().deleted, 10);
    assert!(repo.find_all().unwrap().first_or_default().unwrap().is_none());
    assert!(repo.find(&eq("empId", -1)).unwrap().first_or_default().unwrap().is_none());
}
