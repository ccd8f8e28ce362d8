#[cfg(test)]
mod tests {
    use crate::api::auth::{LoginResponse, SessionData};
    use crate::api::admin::InviteResponse;
    use crate::api::UserData;
    use crate::test::test_utils::{
        ADMIN_EMAIL, STANDARD_PASSWORD, TRAINEE_EMAIL, create_standard_test_db, login_test_user,
        setup_test_client,
    };
    use crate::validation::ValidationResponse;
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::json;

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let login = login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        assert!(login.success);
        assert_eq!(login.redirect_url.as_deref(), Some("/"));
        let user = login.user.expect("Missing user");
        assert_eq!(user.email, TRAINEE_EMAIL);
        assert_eq!(user.role, "trainee");

        let login = login_test_user(&client, TRAINEE_EMAIL, "wrong_password").await;

        assert!(!login.success);
        assert!(login.user.is_none());
        assert_eq!(login.error.as_deref(), Some("Invalid login credentials"));
    }

    #[rocket::async_test]
    async fn test_admin_login_lands_on_admin() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let login = login_test_user(&client, ADMIN_EMAIL, STANDARD_PASSWORD).await;

        assert!(login.success);
        assert_eq!(login.redirect_url.as_deref(), Some("/admin"));
    }

    #[rocket::async_test]
    async fn test_login_rejects_malformed_email() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "not-an-email", "password": "x" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);

        let body: ValidationResponse = response.into_json().await.unwrap();
        assert!(body.errors.contains_key("email"));
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let endpoints = vec!["/api/me", "/api/admin/workshops", "/api/admin/users"];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    async fn test_api_session_security() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let forged_cookie = Cookie::build(("session_token", "fake_token")).build();

        let response = client
            .get("/api/me")
            .private_cookie(forged_cookie)
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_me_api() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let user_data: UserData = response.into_json().await.unwrap();

        assert_eq!(user_data.email, TRAINEE_EMAIL);
        assert_eq!(user_data.fname, "Tom");
        assert_eq!(user_data.role, "trainee");
        assert!(user_data.confirmed);
    }

    #[rocket::async_test]
    async fn test_logout_ends_session() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(response.headers().get_one("Location"), Some("/login"));

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_refresh_extends_session() {
        let test_db = create_standard_test_db().await;
        let trainee_id = test_db.user_id(TRAINEE_EMAIL).unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.post("/api/refresh").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        login_test_user(&client, TRAINEE_EMAIL, STANDARD_PASSWORD).await;

        let response = client.post("/api/refresh").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let session: SessionData = response.into_json().await.unwrap();
        assert_eq!(session.user_id, trainee_id);
        assert!(session.expires_at > chrono::Utc::now().naive_utc());
    }

    #[rocket::async_test]
    async fn test_invite_and_accept() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        login_test_user(&client, ADMIN_EMAIL, STANDARD_PASSWORD).await;

        let response = client
            .post("/api/admin/users/invite")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "new@example.com",
                    "fname": "Nina",
                    "lname": "New",
                    "is_admin": false
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let invite: InviteResponse = response.into_json().await.unwrap();
        assert_eq!(invite.notification.message, "User invited successfully!");

        let invited = crate::db::get_user(&test_db.pool, invite.user_id)
            .await
            .unwrap();
        assert!(!invited.confirmed);

        // The invitee signs in from a browser without the admin session.
        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::SeeOther);
        let invitee = &client;

        let response = invitee
            .post("/api/invite/accept")
            .header(ContentType::JSON)
            .body(json!({ "token": invite.invite_token, "password": "s3cret-pass" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let login: LoginResponse = response.into_json().await.unwrap();
        assert!(login.success);
        assert_eq!(login.user.unwrap().email, "new@example.com");

        let response = invitee.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = invitee
            .post("/api/invite/accept")
            .header(ContentType::JSON)
            .body(json!({ "token": invite.invite_token, "password": "s3cret-pass" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_oauth_without_configured_provider() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/auth/oauth/google").dispatch().await;
        assert_eq!(response.status(), Status::ServiceUnavailable);

        let response = client
            .get("/api/auth/oauth/github/callback?code=abc&state=forged")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::SeeOther);
        assert_eq!(
            response.headers().get_one("Location"),
            Some("/login?error=oauth_failed")
        );
    }

    #[rocket::async_test]
    async fn test_health() {
        let test_db = create_standard_test_db().await;
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
