// tests/plan_store.rs

mod common;
use crate::common::builders::{head_update, plan, plan_builder};

use habitat::engine::{HeadAdvance, PlanStore};
use habitat::errors::HabitatError;
use habitat::plan::{Commit, Head};

fn store_with(names: &[&str]) -> PlanStore {
    let mut store = PlanStore::new();
    for name in names {
        store.insert(plan(name)).unwrap();
    }
    store
}

#[test]
fn insert_appends_and_resets_head() {
    let mut store = PlanStore::new();
    let checked_out = plan_builder("api").head(Commit::new("abc")).build().unwrap();

    assert_eq!(store.insert(checked_out).unwrap(), 0);
    assert_eq!(store.insert(plan("web")).unwrap(), 1);

    assert_eq!(store.get(0).unwrap().head, Head::NotYetCheckedOut);
    let names: Vec<String> = store.snapshot().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["api", "web"]);
}

#[test]
fn duplicate_names_are_rejected() {
    let mut store = store_with(&["api"]);

    assert!(matches!(
        store.insert(plan("api")),
        Err(HabitatError::DuplicatePlan(ref n)) if n == "api"
    ));
    assert_eq!(store.len(), 1);
}

#[test]
fn replace_cannot_rename_onto_another_plan() {
    let mut store = store_with(&["api", "web"]);

    assert!(matches!(
        store.replace(0, plan("web")),
        Err(HabitatError::DuplicatePlan(_))
    ));
    assert!(matches!(
        store.replace(5, plan("api")),
        Err(HabitatError::PlanNotFound(_))
    ));

    store.replace(0, plan("gateway")).unwrap();
    assert_eq!(store.get(0).unwrap().name, "gateway");
    assert!(store.find("api").is_none());
}

#[test]
fn replace_keeps_head_for_same_name_and_repository() {
    let mut store = store_with(&["api"]);
    assert_eq!(
        store.advance_head(&head_update(&plan("api"), "abc")),
        HeadAdvance::Applied
    );

    store
        .replace(0, plan_builder("api").env("K", "v").build().unwrap())
        .unwrap();
    assert_eq!(store.get(0).unwrap().head, Head::Commit(Commit::new("abc")));

    store
        .replace(
            0,
            plan_builder("api")
                .repository("https://other.example.com/api.git")
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(store.get(0).unwrap().head, Head::NotYetCheckedOut);
}

#[test]
fn remove_by_index_and_name() {
    let mut store = store_with(&["api", "web", "db"]);

    assert_eq!(store.remove(1).unwrap().name, "web");
    assert_eq!(store.remove_named("db").unwrap().name, "db");
    assert!(matches!(store.remove(3), Err(HabitatError::PlanNotFound(_))));
    assert!(matches!(
        store.remove_named("web"),
        Err(HabitatError::PlanNotFound(_))
    ));
    assert_eq!(store.len(), 1);
}

#[test]
fn advance_head_ignores_unknown_plans() {
    let mut store = store_with(&["api"]);

    assert_eq!(
        store.advance_head(&head_update(&plan("gone"), "abc")),
        HeadAdvance::PlanGone
    );
    assert_eq!(store.get(0).unwrap().head, Head::NotYetCheckedOut);
}

#[test]
fn advance_head_requires_the_same_repository() {
    let mut store = store_with(&["api"]);
    let old = plan("api");
    let new_branch = plan_builder("api").branch("release").build().unwrap();
    store.replace(0, new_branch.clone()).unwrap();

    assert_eq!(
        store.advance_head(&head_update(&old, "abc")),
        HeadAdvance::RepositoryChanged
    );
    assert_eq!(store.get(0).unwrap().head, Head::NotYetCheckedOut);

    assert_eq!(
        store.advance_head(&head_update(&new_branch, "def")),
        HeadAdvance::Applied
    );
    assert_eq!(store.get(0).unwrap().head, Head::Commit(Commit::new("def")));
}
