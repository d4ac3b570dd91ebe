#[cfg(test)]
mod tests {
    use crate::api::{MeResponse, OverviewResponse, ProgramView};
    use crate::dates::DayKey;
    use crate::models::{Subject, UserPublic};
    use crate::role::UserRole;
    use crate::test::test_utils::{
        COACH_EMAIL, OTHER_STUDENT_EMAIL, STANDARD_PASSWORD, STUDENT_EMAIL,
        create_standard_backend, login_test_user, setup_test_client,
    };
    use crate::validation::ValidationResponse;
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};

    const WEEK: &str = "2024-03-04";

    async fn body<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        let text = response.into_string().await.expect("Response should have a body");
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("Unexpected body {}: {}", text, e))
    }

    async fn put_json<'c>(client: &'c Client, uri: String, cookies: &[Cookie<'static>], payload: Value) -> LocalResponse<'c> {
        client
            .put(uri)
            .header(ContentType::JSON)
            .cookies(cookies.to_vec())
            .body(payload.to_string())
            .dispatch()
            .await
    }

    async fn post_json<'c>(client: &'c Client, uri: String, cookies: &[Cookie<'static>], payload: Value) -> LocalResponse<'c> {
        client
            .post(uri)
            .header(ContentType::JSON)
            .cookies(cookies.to_vec())
            .body(payload.to_string())
            .dispatch()
            .await
    }

    #[rocket::async_test]
    async fn test_login_api() {
        let (client, uids) = setup_test_client(create_standard_backend().await).await;

        let response = post_json(
            &client,
            "/api/login".to_string(),
            &[],
            json!({ "email": STUDENT_EMAIL, "password": STANDARD_PASSWORD }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get_private("session_token").is_some());

        let me: MeResponse = body(response).await;
        assert_eq!(me.user.uid, uids[STUDENT_EMAIL]);
        assert_eq!(me.user.display_name.as_deref(), Some("Ali Yılmaz"));
        assert_eq!(me.role, UserRole::Student);

        let response = post_json(
            &client,
            "/api/login".to_string(),
            &[],
            json!({ "email": STUDENT_EMAIL, "password": "wrong_password" }),
        )
        .await;
        assert_eq!(response.status(), Status::Unauthorized);
        let error: ValidationResponse = body(response).await;
        assert_eq!(error.status, "error");
        assert_eq!(error.errors["authentication"], vec!["E-posta veya şifre hatalı."]);
    }

    #[rocket::async_test]
    async fn test_me_requires_valid_session() {
        let (client, _) = setup_test_client(create_standard_backend().await).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let error: ValidationResponse = body(response).await;
        assert_eq!(error.errors["authentication"], vec!["Giriş gerekli."]);

        let forged_cookie = Cookie::build(("session_token", "fake_token")).build();
        let response = client
            .get("/api/me")
            .private_cookie(forged_cookie)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let cookies = login_test_user(&client, COACH_EMAIL, STANDARD_PASSWORD).await;
        let response = client.get("/api/me").cookies(cookies.clone()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let me: MeResponse = body(response).await;
        assert_eq!(me.role, UserRole::Teacher);

        let response = client.post("/api/logout").cookies(cookies.clone()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").cookies(cookies).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_signup_api() {
        let (client, _) = setup_test_client(create_standard_backend().await).await;

        let response = post_json(
            &client,
            "/api/signup".to_string(),
            &[],
            json!({
                "email": "yeni@example.com",
                "password": "gizli123",
                "displayName": "Yeni Koç",
                "accountType": "Öğretmen"
            }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let me: MeResponse = body(response).await;
        assert_eq!(me.role, UserRole::Teacher);
        assert_eq!(me.user.email, "yeni@example.com");

        let response = post_json(
            &client,
            "/api/signup".to_string(),
            &[],
            json!({ "email": "not-an-email", "password": "123" }),
        )
        .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let error: ValidationResponse = body(response).await;
        assert!(error.errors.contains_key("email"));
        assert!(error.errors.contains_key("password"));

        let response = post_json(
            &client,
            "/api/signup".to_string(),
            &[],
            json!({ "email": STUDENT_EMAIL, "password": "gizli123" }),
        )
        .await;
        assert_eq!(response.status(), Status::BadRequest);
        let error: ValidationResponse = body(response).await;
        assert_eq!(
            error.errors["validation"],
            vec!["Bu e-posta ile kayıtlı bir hesap zaten var."]
        );
    }

    #[rocket::async_test]
    async fn test_password_reset_api() {
        let (client, _) = setup_test_client(create_standard_backend().await).await;

        for email in [STUDENT_EMAIL, "kimse@example.com"] {
            let response = post_json(
                &client,
                "/api/password-reset".to_string(),
                &[],
                json!({ "email": email }),
            )
            .await;
            assert_eq!(response.status(), Status::Accepted);
        }

        let response = post_json(
            &client,
            "/api/password-reset/confirm".to_string(),
            &[],
            json!({ "token": "made-up", "password": "yeniSifre1" }),
        )
        .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn test_daily_studies_api() {
        let (client, uids) = setup_test_client(create_standard_backend().await).await;
        let cookies = login_test_user(&client, STUDENT_EMAIL, STANDARD_PASSWORD).await;

        let response = put_json(
            &client,
            format!("/api/daily/{}", WEEK),
            &cookies,
            json!({
                "Türkçe": { "questions": 10, "correct": 7, "wrong": 2, "blank": 1, "minutes": 40 },
                "Matematik": { "questions": 12, "correct": 5, "wrong": 2, "blank": 1, "minutes": 30 }
            }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let report: Value = body(response).await;
        assert_eq!(report["date"], json!(WEEK));
        assert_eq!(report["mismatched"], json!(["Matematik"]));

        let response = client
            .get(format!("/api/daily/{}", WEEK))
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let day: Value = body(response).await;
        assert_eq!(day["Türkçe"]["questions"], json!(10));

        // Untouched rows are not saved over earlier values.
        let response = put_json(
            &client,
            format!("/api/daily/{}", WEEK),
            &cookies,
            json!({ "Türkçe": { "questions": 0, "correct": 0, "wrong": 0, "blank": 0, "minutes": 0 } }),
        )
        .await;
        let report: Value = body(response).await;
        assert_eq!(report["saved"], json!([]));

        let response = client.get("/api/daily").cookies(cookies.clone()).dispatch().await;
        let all: Value = body(response).await;
        assert!(all.get(WEEK).is_some());

        let response = client
            .get(format!("/api/overview?week={}", "2024-03-06"))
            .cookies(cookies.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let overview: OverviewResponse = body(response).await;
        assert_eq!(overview.week_start, WEEK);
        assert_eq!(overview.totals.questions, 22);
        assert_eq!(overview.totals.minutes, 70);
        assert_eq!(overview.points[0].questions, 22);
        assert_eq!(overview.by_subject[0].subject, Subject::Turkce);
        assert_eq!(overview.by_subject[0].questions, 10);

        let response = client.get("/api/weeks").cookies(cookies.clone()).dispatch().await;
        let weeks: Value = body(response).await;
        assert_eq!(weeks[0]["id"], json!("2024-03-04_2024-03-10"));

        let response = put_json(&client, "/api/daily/2024-13-40".to_string(), &cookies, json!({})).await;
        assert_eq!(response.status(), Status::BadRequest);

        // Coaches see the overview of linked students.
        let coach = login_test_user(&client, COACH_EMAIL, STANDARD_PASSWORD).await;
        let response = client
            .get(format!("/api/students/{}/overview?week={}", uids[STUDENT_EMAIL], WEEK))
            .cookies(coach.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // But do not record studies themselves.
        let response = put_json(&client, format!("/api/daily/{}", WEEK), &coach, json!({})).await;
        assert_eq!(response.status(), Status::Forbidden);

        // 32-bit overflow in the answer breakdown is still a mismatch.
        let response = put_json(
            &client,
            "/api/daily/2024-03-11".to_string(),
            &cookies,
            json!({ "Türkçe": { "questions": 1, "correct": 4294967295u32, "wrong": 2, "blank": 0, "minutes": 0 } }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let report: Value = body(response).await;
        assert_eq!(report["mismatched"], json!(["Türkçe"]));
    }

    #[rocket::async_test]
    async fn test_link_students_api() {
        let (client, uids) = setup_test_client(create_standard_backend().await).await;
        let coach = login_test_user(&client, COACH_EMAIL, STANDARD_PASSWORD).await;

        let response = post_json(
            &client,
            "/api/students".to_string(),
            &coach,
            json!({ "email": OTHER_STUDENT_EMAIL }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let linked: Value = body(response).await;
        assert_eq!(linked["outcome"], json!("linked"));
        assert_eq!(linked["student"]["uid"], json!(uids[OTHER_STUDENT_EMAIL]));
        assert_eq!(linked["message"], json!("Eklendi: Zeynep Kaya"));

        let response = post_json(
            &client,
            "/api/students".to_string(),
            &coach,
            json!({ "email": "kimse@example.com" }),
        )
        .await;
        let missing: Value = body(response).await;
        assert_eq!(missing["outcome"], json!("not_found"));

        let response = client.get("/api/students").cookies(coach).dispatch().await;
        let students: Vec<UserPublic> = body(response).await;
        assert_eq!(students.len(), 2);

        let student = login_test_user(&client, OTHER_STUDENT_EMAIL, STANDARD_PASSWORD).await;
        let response = client.get("/api/coaches").cookies(student.clone()).dispatch().await;
        let coaches: Vec<UserPublic> = body(response).await;
        assert_eq!(coaches[0].display_name, "Ayşe Koç");

        let response = client.get("/api/students").cookies(student).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_weekly_program_api() {
        let (client, uids) = setup_test_client(create_standard_backend().await).await;
        let coach = login_test_user(&client, COACH_EMAIL, STANDARD_PASSWORD).await;
        let student = login_test_user(&client, STUDENT_EMAIL, STANDARD_PASSWORD).await;
        let student_uid = &uids[STUDENT_EMAIL];

        let response = put_json(
            &client,
            format!("/api/students/{}/program/{}", student_uid, WEEK),
            &coach,
            json!({
                "mon": [
                    { "subject": "Türkçe", "minutes": 20, "questions": 10, "note": "", "done": 0 },
                    { "subject": "Matematik", "minutes": 30, "done": 0 }
                ],
                "wed": [{ "subject": "Fen Bilimleri", "minutes": 45, "done": 0 }]
            }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let saved: ProgramView = body(response).await;
        assert_eq!(saved.completion.total, 3);
        assert_eq!(saved.tasks[&DayKey::Mon].len(), 2);

        // Not a Monday.
        let response = put_json(
            &client,
            format!("/api/students/{}/program/2024-03-05", student_uid),
            &coach,
            json!({}),
        )
        .await;
        assert_eq!(response.status(), Status::BadRequest);

        // Not linked to this coach.
        let response = client
            .get(format!("/api/students/{}/program?week={}", uids[OTHER_STUDENT_EMAIL], WEEK))
            .cookies(coach.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get(format!("/api/program?week={}", WEEK))
            .cookies(student.clone())
            .dispatch()
            .await;
        let view: ProgramView = body(response).await;
        assert_eq!(view.tasks, saved.tasks);

        // Students flip completion only.
        let response = put_json(
            &client,
            format!("/api/program/{}/mon", WEEK),
            &student,
            json!([
                { "subject": "Türkçe", "minutes": 20, "questions": 10, "note": "", "done": 1 },
                { "subject": "Matematik", "minutes": 30, "done": true }
            ]),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);
        let view: ProgramView = body(response).await;
        assert_eq!(view.completion.done, 2);
        assert_eq!(view.stats.total_minutes, 50.0);

        let response = put_json(
            &client,
            format!("/api/program/{}/mon", WEEK),
            &student,
            json!([{ "subject": "Türkçe", "minutes": 5, "done": 1 }]),
        )
        .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = put_json(&client, format!("/api/program/{}/fri", "2024-03-11"), &student, json!([])).await;
        assert_eq!(response.status(), Status::NotFound);

        // The coach's mirror carries the student's ticks.
        let response = client
            .get(format!("/api/students/{}/program?week={}", student_uid, WEEK))
            .cookies(coach)
            .dispatch()
            .await;
        let teacher_view: ProgramView = body(response).await;
        assert_eq!(teacher_view.completion.percent, 67);
        assert_eq!(teacher_view.program, view.program);
    }

    #[rocket::async_test]
    async fn test_assignments_api() {
        let (client, uids) = setup_test_client(create_standard_backend().await).await;
        let coach = login_test_user(&client, COACH_EMAIL, STANDARD_PASSWORD).await;
        let student = login_test_user(&client, STUDENT_EMAIL, STANDARD_PASSWORD).await;
        let student_uid = &uids[STUDENT_EMAIL];

        let response = post_json(
            &client,
            format!("/api/students/{}/assignments", student_uid),
            &coach,
            json!({ "title": "Paragraf çalışması", "course": "Türkçe" }),
        )
        .await;
        assert_eq!(response.status(), Status::Created);
        let created: Value = body(response).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], json!("pending"));

        let response = post_json(
            &client,
            format!("/api/students/{}/assignments", uids[OTHER_STUDENT_EMAIL]),
            &coach,
            json!({ "title": "Yetkisiz" }),
        )
        .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get("/api/assignments?filter=pending&q=paragraf")
            .cookies(student.clone())
            .dispatch()
            .await;
        let pending: Vec<Value> = body(response).await;
        assert_eq!(pending.len(), 1);

        let response = put_json(
            &client,
            format!("/api/assignments/{}/status", id),
            &student,
            json!({ "status": "done" }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get("/api/assignments?filter=done")
            .cookies(student.clone())
            .dispatch()
            .await;
        let done: Vec<Value> = body(response).await;
        assert_eq!(done[0]["id"], json!(id));

        let response = client
            .get("/api/assignments?filter=someday")
            .cookies(student)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let other = login_test_user(&client, OTHER_STUDENT_EMAIL, STANDARD_PASSWORD).await;
        let response = put_json(
            &client,
            format!("/api/assignments/{}/status", id),
            &other,
            json!({ "status": "pending" }),
        )
        .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .get(format!("/api/students/{}/assignments", student_uid))
            .cookies(coach)
            .dispatch()
            .await;
        let listed: Vec<Value> = body(response).await;
        assert_eq!(listed[0]["status"], json!("done"));
    }

    #[rocket::async_test]
    async fn test_health() {
        let (client, _) = setup_test_client(create_standard_backend().await).await;
        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.as_deref(), Some("OK"));
    }
}
