#![allow(clippy::unwrap_used)]

mod common;

use axum::http::StatusCode;
use rollcall_server::queue::{CommandQueue, PRIORITY_NORMAL};
use rollcall_server::storage::CommandStatus;
use rollcall_core::Config;
use rollcall_core::wire::CommandPayload;

use common::{app, app_with};

#[tokio::test]
async fn unknown_or_missing_serial_is_rejected() {
    let app = app().await;
    assert_eq!(app.get("/getrequest?SN=NOPE").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/getrequest").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.post("/iclock/cdata?SN=NOPE&table=ATTLOG", "1\t2024-03-04 08:00:00").await.0,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn deactivated_device_is_rejected() {
    let app = app().await;
    let device = app.device("SN-1", "school-1").await;
    app.db.deactivate_device(device.id).await.unwrap();
    assert_eq!(app.get("/getrequest?SN=SN-1").await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn handshake_is_served_under_both_prefixes() {
    let app = app().await;
    app.device("SN-1", "school-1").await;

    for uri in ["/cdata?SN=SN-1&options=all", "/iclock/cdata?SN=SN-1&options=all"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("GET OPTION FROM: SN-1\n"), "{body}");
        assert!(body.contains("ATTLOGStamp=None"));
    }

    let (status, body) = app.get("/iclock/cdata?SN=SN-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn poll_marks_device_online() {
    let app = app().await;
    let device = app.device("SN-1", "school-1").await;
    assert!(!device.is_online);

    app.get("/iclock/getrequest?SN=SN-1").await;
    let device = app.db.get_device(device.id).await.unwrap();
    assert!(device.is_online);
    assert!(device.last_seen.is_some());
}

#[tokio::test]
async fn queued_command_is_delivered_once_and_confirmed() {
    let app = app().await;
    let device = app.device("SN-1", "school-1").await;
    let queue = CommandQueue::new(app.db.clone());
    let cmd = queue
        .enqueue(device.id, &CommandPayload::Restart, PRIORITY_NORMAL)
        .await
        .unwrap();

    let (_, body) = app.get("/iclock/getrequest?SN=SN-1").await;
    assert_eq!(body, format!("C:{}:REBOOT", cmd.id));
    let (_, body) = app.get("/iclock/getrequest?SN=SN-1").await;
    assert_eq!(body, "OK");

    let (status, body) = app
        .post(
            "/iclock/devicecmd?SN=SN-1",
            &format!("ID={}&Return=0&CMD=REBOOT\n", cmd.id),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    let cmd = app.db.get_command(cmd.id).await.unwrap();
    assert_eq!(cmd.status(), Some(CommandStatus::Completed));
}

#[tokio::test]
async fn confirmation_for_another_device_is_ignored() {
    let app = app().await;
    let owner = app.device("SN-1", "school-1").await;
    app.device("SN-2", "school-1").await;
    let queue = CommandQueue::new(app.db.clone());
    let cmd = queue
        .enqueue(owner.id, &CommandPayload::ClearLogs, PRIORITY_NORMAL)
        .await
        .unwrap();
    app.get("/getrequest?SN=SN-1").await;

    let (_, body) = app
        .post("/devicecmd?SN=SN-2", &format!("ID={}&Return=0\n", cmd.id))
        .await;
    assert_eq!(body, "OK");
    let cmd = app.db.get_command(cmd.id).await.unwrap();
    assert_eq!(cmd.status(), Some(CommandStatus::Sent));
}

#[tokio::test]
async fn attendance_upload_is_always_acknowledged() {
    let app = app().await;
    let device = app.device("SN-1", "school-1").await;
    app.db.upsert_person(7, "school-1", "Ann", Some("C7")).await.unwrap();

    let body = "7\t2024-03-04 07:55:00\t0\t1\t0\ngarbage\n123456\t2024-03-04 08:00:00\n";
    for _ in 0..2 {
        let (status, text) = app.post("/iclock/cdata?SN=SN-1&table=ATTLOG", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "OK");
    }

    let rows = app
        .db
        .list_attendance_by_date("school-1", "2024-03-04")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].person_id, 7);
    assert_eq!(rows[0].device_id, Some(device.id));
}

#[tokio::test]
async fn unhandled_tables_are_acknowledged() {
    let app = app().await;
    app.device("SN-1", "school-1").await;
    let (status, body) = app
        .post("/cdata?SN=SN-1&table=ATTPHOTO&Stamp=9", "PIN=1\tsize=0")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn repeated_query_keys_still_get_an_answer() {
    let app = app().await;
    app.device("SN-1", "school-1").await;
    app.db.upsert_person(7, "school-1", "Ann", Some("C7")).await.unwrap();

    let (status, body) = app
        .post(
            "/iclock/cdata?SN=SN-1&table=ATTLOG&table=ATTLOG",
            "7\t2024-03-04 08:00:00\n",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    let rows = app.db.list_attendance_by_date("school-1", "2024-03-04").await.unwrap();
    assert_eq!(rows.len(), 1);

    let (status, body) = app
        .get("/iclock/cdata?SN=SN-1&SN=SN-1&options=all&options=all")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("GET OPTION FROM: SN-1\n"), "{body}");
}

#[tokio::test]
async fn large_buffered_upload_is_ingested() {
    let app = app().await;
    app.device("SN-1", "school-1").await;
    app.db.upsert_person(7, "school-1", "Ann", Some("C7")).await.unwrap();

    // Above axum's stock 2 MiB limit, mostly operation log noise.
    let mut body = String::from("7\t2024-03-04 08:00:00\n");
    let oplog = "OPLOG 4\t0\t2024-03-04 08:00:00\t0\t0\t0\t0\n";
    while body.len() < 3 * 1024 * 1024 {
        body.push_str(oplog);
    }

    let (status, text) = app.post("/iclock/cdata?SN=SN-1&table=ATTLOG", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "OK");
    let rows = app.db.list_attendance_by_date("school-1", "2024-03-04").await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn upload_over_the_body_limit_is_acknowledged() {
    let mut config = Config::default();
    config.protocol.max_body_bytes = 1024;
    let app = app_with(&config).await;
    app.device("SN-1", "school-1").await;
    app.db.upsert_person(7, "school-1", "Ann", Some("C7")).await.unwrap();

    let body = "7\t2024-03-04 08:00:00\n".repeat(200);
    assert!(body.len() > 1024);
    for uri in ["/iclock/cdata?SN=SN-1&table=ATTLOG", "/iclock/devicecmd?SN=SN-1"] {
        let (status, text) = app.post(uri, &body).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(text, "OK", "{uri}");
    }
    let rows = app.db.list_attendance_by_date("school-1", "2024-03-04").await.unwrap();
    assert!(rows.is_empty());
}
