// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Repos, timeline and milestones scrapes run through the sync service
//! against a mocked GitHub/GitLab API.

use devboard_integrations::db::ConnectionStore;
use devboard_integrations::models::{Connection, RepoSummary, ScrapeSnapshot, ScrapeType};
use devboard_integrations::providers::ProviderId;
use devboard_integrations::services::scrape::MAX_REPO_PAGES;
use devboard_integrations::services::tasks::SyncConnectionPayload;
use devboard_integrations::services::SyncOutcome;
use mockito::Matcher;
use serde_json::{json, Value};

mod common;

fn github_app(server: &mockito::ServerGuard) -> common::TestApp {
    common::create_test_app_with(common::registry_with(&[(
        "INTEGRATION_GITHUB_API_URL",
        server.url().as_str(),
    )]))
}

fn task(conn: &Connection, scrape_type: ScrapeType) -> SyncConnectionPayload {
    SyncConnectionPayload {
        connection_id: conn.id.clone(),
        scrape_type,
        attempt: 0,
    }
}

fn gh_repo(name: &str, stars: u64, pushed_at: &str) -> Value {
    json!({
        "name": name,
        "full_name": format!("octo/{}", name),
        "html_url": format!("https://github.com/octo/{}", name),
        "private": false,
        "fork": false,
        "stargazers_count": stars,
        "watchers_count": stars,
        "forks_count": 0,
        "pushed_at": pushed_at
    })
}

async fn stored_github(app: &common::TestApp) -> Connection {
    let mut conn = common::test_connection("user-1", ProviderId::GitHub, "42");
    conn.provider_info = json!({"id": 42, "login": "octo", "followers": 3});
    app.store.upsert_connection(&conn).await.unwrap();
    conn
}

async fn snapshot(app: &common::TestApp, provider: ProviderId, t: ScrapeType) -> Value {
    app.store
        .get_snapshot("user-1", provider, t)
        .await
        .unwrap()
        .expect("snapshot stored")
        .payload_json()
}

fn repos_of(payload: Value) -> Vec<RepoSummary> {
    serde_json::from_value(payload).unwrap()
}

// ─── Repos ───────────────────────────────────────────────────

#[tokio::test]
async fn test_repo_walk_follows_link_and_counts_contributors() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}/user/repos?page=2", server.url());

    let page1 = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("sort".into(), "pushed".into()))
        .match_header("authorization", "Bearer access-token")
        .with_status(200)
        .with_header("link", &format!("<{}>; rel=\"next\"", next))
        .with_body(json!([gh_repo("popular", 25, "2026-03-01T00:00:00Z"), gh_repo("team", 2, "2026-04-01T00:00:00Z")]).to_string())
        .expect(1)
        .create_async()
        .await;

    let mut forked = gh_repo("forked", 3, "2026-01-01T00:00:00Z");
    forked["fork"] = json!(true);
    let mut secret = gh_repo("secret", 4, "2026-01-01T00:00:00Z");
    secret["private"] = json!(true);
    let page2 = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(json!([gh_repo("solo", 1, "2026-02-01T00:00:00Z"), forked, secret]).to_string())
        .expect(1)
        .create_async()
        .await;

    // One contributor per page: the `last` page number is the count
    let team = server
        .mock("GET", "/repos/octo/team/contributors")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header(
            "link",
            "<https://api.github.com/repositories/1/contributors?per_page=1&anon=1&page=4>; rel=\"last\"",
        )
        .with_body("[{}]")
        .expect(1)
        .create_async()
        .await;
    let solo = server
        .mock("GET", "/repos/octo/solo/contributors")
        .match_query(Matcher::Any)
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let app = github_app(&server);
    let conn = stored_github(&app).await;

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Repos))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { first_scrape: true });
    for mock in [&page1, &page2, &team, &solo] {
        mock.assert_async().await;
    }

    let repos = repos_of(snapshot(&app, ProviderId::GitHub, ScrapeType::Repos).await);
    assert_eq!(repos.len(), 5);
    let by_name = |n: &str| repos.iter().find(|r| r.name == n).unwrap().clone();
    assert_eq!(by_name("team").contributors, Some(4));
    assert!(by_name("team").is_significant());
    assert_eq!(by_name("solo").contributors, Some(0));
    assert_eq!(by_name("forked").contributors, None);
    assert_eq!(by_name("secret").contributors, None);

    // Stars count owned public non-forks only
    let after = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(after.provider_info["stars"], 28);
    assert_eq!(after.provider_info["login"], "octo");

    // Timeline: significant repos, most recent push first
    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Timeline))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { first_scrape: false });
    let timeline = repos_of(snapshot(&app, ProviderId::GitHub, ScrapeType::Timeline).await);
    let names: Vec<&str> = timeline.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["team", "popular"]);

    let after = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert!(after.last_timeline_sync_at.is_some());
}

#[tokio::test]
async fn test_interrupted_repo_walk_resumes_and_dedups() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}/user/repos?page=2", server.url());

    let page1 = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("sort".into(), "pushed".into()))
        .with_status(200)
        .with_header("link", &format!("<{}>; rel=\"next\"", next))
        .with_body(json!([gh_repo("popular", 25, "2026-03-01T00:00:00Z"), gh_repo("big", 40, "2026-04-01T00:00:00Z")]).to_string())
        .expect(1)
        .create_async()
        .await;
    let broken = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let app = github_app(&server);
    let conn = stored_github(&app).await;

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Repos))
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Rescheduled { .. }));
    broken.assert_async().await;
    assert!(app
        .store
        .get_snapshot("user-1", ProviderId::GitHub, ScrapeType::Repos)
        .await
        .unwrap()
        .is_none());

    broken.remove_async().await;
    // The retried page repeats a repo already staged from page 1
    let page2 = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(json!([gh_repo("big", 40, "2026-04-01T00:00:00Z"), gh_repo("new", 11, "2026-05-01T00:00:00Z")]).to_string())
        .expect(1)
        .create_async()
        .await;

    app.state.sync.gate().reset(ProviderId::GitHub).await.unwrap();
    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Repos))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { first_scrape: true });

    // Page 1 was not fetched again
    page1.assert_async().await;
    page2.assert_async().await;

    let repos = repos_of(snapshot(&app, ProviderId::GitHub, ScrapeType::Repos).await);
    let mut names: Vec<String> = repos.into_iter().map(|r| r.full_name).collect();
    names.sort();
    assert_eq!(names, vec!["octo/big", "octo/new", "octo/popular"]);

    let after = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert_eq!(after.provider_info["stars"], 76);
}

#[tokio::test]
async fn test_repo_walk_stops_at_page_limit() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}/user/repos?page=99", server.url());
    let link = format!("<{}>; rel=\"next\"", next);
    let body = json!([gh_repo("popular", 25, "2026-03-01T00:00:00Z")]).to_string();

    let first = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("sort".into(), "pushed".into()))
        .with_status(200)
        .with_header("link", &link)
        .with_body(&body)
        .expect(1)
        .create_async()
        .await;
    // Every later page claims there is another
    let endless = server
        .mock("GET", "/user/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "99".into()))
        .with_status(200)
        .with_header("link", &link)
        .with_body(&body)
        .expect(MAX_REPO_PAGES as usize - 1)
        .create_async()
        .await;

    let app = github_app(&server);
    let conn = stored_github(&app).await;

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Repos))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { first_scrape: true });
    first.assert_async().await;
    endless.assert_async().await;

    let repos = repos_of(snapshot(&app, ProviderId::GitHub, ScrapeType::Repos).await);
    assert_eq!(repos.len(), 1);
}

#[tokio::test]
async fn test_gitlab_projects_without_contributor_lookups() {
    let mut server = mockito::Server::new_async().await;
    let projects = server
        .mock("GET", "/users/7/projects")
        .match_query(Matcher::UrlEncoded("owned".into(), "true".into()))
        .with_status(200)
        .with_body(
            json!([
                {"name": "a", "path_with_namespace": "me/a", "visibility": "public",
                 "star_count": 12, "forks_count": 0, "last_activity_at": "2026-02-01T00:00:00Z"},
                {"name": "b", "path_with_namespace": "me/b", "visibility": "private",
                 "star_count": 0, "forks_count": 0}
            ])
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let app = common::create_test_app_with(common::registry_with(&[(
        "INTEGRATION_GITLAB_API_URL",
        server.url().as_str(),
    )]));
    let mut conn = common::test_connection("user-1", ProviderId::GitLab, "7");
    conn.provider_info = json!({"id": 7, "username": "me", "followers": 2});
    app.store.upsert_connection(&conn).await.unwrap();

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Repos))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Synced { first_scrape: true });
    projects.assert_async().await;

    let repos = repos_of(snapshot(&app, ProviderId::GitLab, ScrapeType::Repos).await);
    assert_eq!(repos.len(), 2);
    assert!(repos.iter().all(|r| r.contributors.is_none()));

    let after = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert!(after.provider_info.get("stars").is_none());
}

// ─── Milestones ──────────────────────────────────────────────

#[tokio::test]
async fn test_milestones_report_only_new_thresholds() {
    let app = common::create_test_app();
    let mut conn = common::test_connection("user-1", ProviderId::GitHub, "42");
    conn.provider_info = json!({"login": "octo", "stars": 150, "followers": 2});
    app.store.upsert_connection(&conn).await.unwrap();

    app.store
        .upsert_snapshot(&ScrapeSnapshot::new(
            "user-1",
            ProviderId::GitHub,
            ScrapeType::Milestones,
            &json!({"value": 12.0, "reached": [10], "new": [10]}),
            chrono::Utc::now() - chrono::Duration::days(1),
        ))
        .await
        .unwrap();

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Milestones))
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced { .. }));

    let payload = snapshot(&app, ProviderId::GitHub, ScrapeType::Milestones).await;
    assert_eq!(payload["value"], 150.0);
    assert_eq!(payload["reached"], json!([10, 100]));
    assert_eq!(payload["new"], json!([100]));

    let after = app.store.get_connection(&conn.id).await.unwrap().unwrap();
    assert!(after.last_milestones_sync_at.is_some());
}

#[tokio::test]
async fn test_milestones_without_signal_reach_nothing() {
    let app = common::create_test_app();
    let mut conn = common::test_connection("user-1", ProviderId::Reddit, "abc");
    conn.provider_info = json!({"name": "alice"});
    app.store.upsert_connection(&conn).await.unwrap();

    let outcome = app
        .state
        .sync
        .sync_connection(&task(&conn, ScrapeType::Milestones))
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced { .. }));

    let payload = snapshot(&app, ProviderId::Reddit, ScrapeType::Milestones).await;
    assert!(payload["value"].is_null());
    assert_eq!(payload["reached"], json!([]));
    assert_eq!(payload["new"], json!([]));
}
