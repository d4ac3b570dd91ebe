#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::registry::{
        LinkOutcome, add_student_by_email, coach_uids, extract_public, find_by_email,
        get_user_lite, is_linked, link, list_coaches, list_students, observe_student_uids,
        profile_path, student_uids,
    };
    use crate::store::WriteBatch;
    use crate::test::test_utils::{
        COACH_EMAIL, OTHER_STUDENT_EMAIL, STUDENT_EMAIL, create_standard_backend, memory_store,
    };

    #[test]
    fn test_extract_public_prefers_root_fields() {
        let profile = json!({
            "displayName": "Ali",
            "userData": { "displayName": "Eski Ad", "email": "eski@example.com" }
        });
        let user = extract_public("u1", &profile);
        assert_eq!(user.uid, "u1");
        assert_eq!(user.display_name, "Ali");
        assert_eq!(user.email, "eski@example.com");

        let user = extract_public("u2", &json!({}));
        assert_eq!(user.display_name, "(isimsiz)");
        assert_eq!(user.email, "");
    }

    #[tokio::test]
    async fn test_find_by_email_checks_nested_field_first() {
        let store = memory_store().await;
        store
            .commit(
                WriteBatch::new()
                    .set(profile_path("a").unwrap(), json!({ "email": "x@example.com", "displayName": "Kök" }))
                    .set(
                        profile_path("b").unwrap(),
                        json!({ "userData": { "email": "x@example.com", "displayName": "İç" } }),
                    )
                    .set(profile_path("c").unwrap(), json!({ "email": "y@example.com" })),
            )
            .await
            .unwrap();

        let found = find_by_email(store.as_ref(), "x@example.com").await.unwrap().unwrap();
        assert_eq!(found.uid, "b");
        assert_eq!(found.display_name, "İç");

        let found = find_by_email(store.as_ref(), "y@example.com").await.unwrap().unwrap();
        assert_eq!(found.uid, "c");
        assert_eq!(found.display_name, "(isimsiz)");

        assert!(find_by_email(store.as_ref(), "z@example.com").await.unwrap().is_none());
        assert!(get_user_lite(store.as_ref(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_is_idempotent_and_bidirectional() {
        let store = memory_store().await;

        link(store.as_ref(), "t1", "s1").await.unwrap();
        link(store.as_ref(), "t1", "s1").await.unwrap();
        link(store.as_ref(), "t1", "s2").await.unwrap();

        assert_eq!(student_uids(store.as_ref(), "t1").await.unwrap(), vec!["s1", "s2"]);
        assert_eq!(coach_uids(store.as_ref(), "s1").await.unwrap(), vec!["t1"]);
        assert!(is_linked(store.as_ref(), "t1", "s2").await.unwrap());
        assert!(!is_linked(store.as_ref(), "s1", "t1").await.unwrap());
        assert!(student_uids(store.as_ref(), "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_student_by_email_outcomes() {
        let test = create_standard_backend().await;
        let store = test.store();
        let coach = test.uid(COACH_EMAIL);

        let outcome = add_student_by_email(store.as_ref(), &coach, "yok@example.com").await.unwrap();
        assert_eq!(outcome, LinkOutcome::NotFound);

        let outcome = add_student_by_email(store.as_ref(), &coach, COACH_EMAIL).await.unwrap();
        assert_eq!(outcome, LinkOutcome::SelfLink);

        let outcome = add_student_by_email(store.as_ref(), &coach, STUDENT_EMAIL).await.unwrap();
        assert!(matches!(outcome, LinkOutcome::AlreadyLinked { .. }));
        assert_eq!(outcome.message(), "Bu öğrenci zaten listenizde.");

        let outcome = add_student_by_email(store.as_ref(), &coach, &format!("  {} ", OTHER_STUDENT_EMAIL))
            .await
            .unwrap();
        let LinkOutcome::Linked { student } = &outcome else {
            panic!("expected a new link, got {:?}", outcome);
        };
        assert_eq!(student.uid, test.uid(OTHER_STUDENT_EMAIL));
        assert_eq!(outcome.message(), "Eklendi: Zeynep Kaya");

        let names: Vec<String> = list_students(store.as_ref(), &coach)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["Ali Yılmaz", "Zeynep Kaya"]);

        let coaches = list_coaches(store.as_ref(), &test.uid(OTHER_STUDENT_EMAIL)).await.unwrap();
        assert_eq!(coaches.len(), 1);
        assert_eq!(coaches[0].email, COACH_EMAIL);
    }

    #[tokio::test]
    async fn test_observe_student_uids() {
        let store = memory_store().await;
        let mut observer = observe_student_uids(store.clone(), "t1").unwrap();

        assert_eq!(observer.next().await.unwrap(), Some(Vec::<String>::new()));

        link(store.as_ref(), "t1", "s1").await.unwrap();
        assert_eq!(observer.next().await.unwrap(), Some(vec!["s1".to_string()]));
    }
}
