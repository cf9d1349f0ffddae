mod common;

use axum::http::{Method, StatusCode};
use lot_lineage_api::entities::{packaging_run, LotPhase, TankStatus};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use common::{approx, lot_codes, TestApp, OTHER_TENANT, TENANT};

#[tokio::test]
async fn split_replaces_parent_with_children_in_listing() {
    let app = TestApp::new().await;
    let source_tank = app.seed_tank(TENANT, "FV-01", Some(2000.0)).await;
    let tank_a = app.seed_tank(TENANT, "BT-01", Some(1000.0)).await;
    let tank_b = app.seed_tank(TENANT, "BT-02", Some(1000.0)).await;
    let parent = app
        .seed_lot(TENANT, "L-001", 1000.0, LotPhase::Conditioning, &source_tank, None)
        .await;

    let res = app
        .post(
            "/api/v1/lots/split",
            json!({
                "source_lot_id": parent.lot_id,
                "targets": [
                    { "tank_id": tank_a.id, "volume": 400.0 },
                    { "tank_id": tank_b.id, "volume": 600.0 }
                ]
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["parent_lot_code"], "L-001");
    let children = res.body["children"].as_array().expect("children");
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["lot_code"], "L-001-A");
    assert!(approx(&children[0]["volume"], 400.0));
    assert_eq!(children[1]["lot_code"], "L-001-B");
    assert!(approx(&children[1]["volume"], 600.0));

    let list = app.list_lots("").await;
    assert_eq!(list.status, StatusCode::OK);
    let mut codes = lot_codes(&list.body);
    codes.sort();
    assert_eq!(codes, vec!["L-001-A", "L-001-B"]);
    assert!(approx(&list.body["stats"]["total_volume"], 1000.0));
    assert_eq!(list.body["stats"]["by_type"]["split"], 2);

    for lot in list.body["lots"].as_array().expect("lots") {
        assert_eq!(lot["lot_type"], "split");
        assert_eq!(lot["phase"], "CONDITIONING");
        assert_eq!(lot["parent_lot_id"], json!(parent.lot_id));
    }

    // The parent stays addressable by id.
    let direct = app
        .get(&format!("/api/v1/lots/{}", parent.lot_id))
        .await;
    assert_eq!(direct.status, StatusCode::OK);
    assert_eq!(direct.body["lot_code"], "L-001");

    let freed = app.find_tank(source_tank.id).await;
    assert_eq!(freed.status, TankStatus::Available.as_str());
    assert!(freed.current_lot_id.is_none());
    assert!(freed.needs_cleaning);

    let held = app.find_tank(tank_a.id).await;
    assert_eq!(held.status, TankStatus::InUse.as_str());
    assert_eq!(held.current_phase.as_deref(), Some("CONDITIONING"));
}

#[tokio::test]
async fn blend_of_two_bright_lots_lists_single_blend_lot() {
    let app = TestApp::new().await;
    let tank_1 = app.seed_tank(TENANT, "BT-01", None).await;
    let tank_2 = app.seed_tank(TENANT, "BT-03", None).await;
    let target = app.seed_tank(TENANT, "T-02", Some(1000.0)).await;
    let first = app
        .seed_lot(TENANT, "L-100", 500.0, LotPhase::Bright, &tank_1, None)
        .await;
    let second = app
        .seed_lot(TENANT, "L-101", 300.0, LotPhase::Bright, &tank_2, None)
        .await;

    let res = app
        .post(
            "/api/v1/lots/blend",
            json!({
                "source_lot_ids": [first.lot_id, second.lot_id],
                "target_tank_id": target.id
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(approx(&res.body["volume"], 800.0));
    assert_eq!(res.body["phase"], "BRIGHT");
    assert_eq!(res.body["tank_id"], json!(target.id));
    let blend_code = res.body["lot_code"].as_str().expect("code").to_string();
    assert!(blend_code.starts_with("BLD-"));

    let list = app.list_lots("").await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(lot_codes(&list.body), vec![blend_code.clone()]);
    let lot = &list.body["lots"][0];
    assert_eq!(lot["lot_type"], "blend");
    assert_eq!(lot["is_blend_result"], true);
    assert_eq!(lot["source_lots"].as_array().map(Vec::len), Some(2));
    assert!(approx(&lot["total_volume"], 800.0));
    assert_eq!(lot["tank"]["name"], "T-02");

    let percentages: Vec<f64> = lot["source_lots"]
        .as_array()
        .expect("source lots")
        .iter()
        .filter_map(|s| s["batch_percentage"].as_f64())
        .collect();
    assert!(percentages.contains(&62.5));
    assert!(percentages.contains(&37.5));

    // Sources are completed and their tanks released.
    for source in [&first, &second] {
        let l = app.find_lot(source.lot_id).await;
        assert_eq!(l.status, "COMPLETED");
        let t = app.find_tank(source.tank_id).await;
        assert!(t.current_lot_id.is_none());
    }

    let all = app.list_lots("active_only=false").await;
    let mut codes = lot_codes(&all.body);
    codes.sort();
    assert_eq!(codes, vec![blend_code, "L-100".to_string(), "L-101".to_string()]);
}

#[tokio::test]
async fn packaging_to_full_volume_completes_lot_batch_and_frees_tank() {
    let app = TestApp::new().await;
    let tank = app.seed_tank(TENANT, "BT-01", Some(1200.0)).await;
    let seeded = app
        .seed_lot(TENANT, "L-200", 1000.0, LotPhase::Bright, &tank, None)
        .await;

    let first = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_id": seeded.lot_id,
                "package_type": "KEG_50L",
                "quantity": 8
            }),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert!(approx(&first.body["packaging_run"]["volume_total"], 400.0));
    assert_eq!(first.body["packaging_run"]["performed_by"], common::USER);
    assert!(approx(&first.body["volume_info"]["remaining_volume"], 600.0));
    assert_eq!(first.body["lot_completed"], false);

    let batch = app.find_batch(seeded.batch_id).await;
    assert_eq!(batch.status, "PACKAGING");
    assert!((batch.packaged_volume - 400.0).abs() < 1e-6);

    let view = app
        .get(&format!("/api/v1/lots/{}", seeded.lot_id))
        .await;
    assert_eq!(view.body["phase"], "PACKAGING");
    assert_eq!(view.body["progress"], 40);
    assert!(approx(&view.body["remaining_volume"], 600.0));

    // 601 L against 600 L remaining sits inside the 1 L tolerance.
    let second = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_number": "L-200",
                "package_type": "BOTTLE_500ML",
                "quantity": 1202
            }),
        )
        .await;
    assert_eq!(second.status, StatusCode::OK, "{}", second.body);
    assert_eq!(second.body["lot_completed"], true);
    assert_eq!(
        second.body["completed_batch_ids"],
        json!([seeded.batch_id])
    );

    let lot = app.find_lot(seeded.lot_id).await;
    assert_eq!(lot.status, "COMPLETED");
    assert!(lot.completed_at.is_some());
    let batch = app.find_batch(seeded.batch_id).await;
    assert_eq!(batch.status, "COMPLETED");
    let tank = app.find_tank(tank.id).await;
    assert_eq!(tank.status, TankStatus::Available.as_str());
    assert!(tank.current_lot_id.is_none());
    assert!(tank.needs_cleaning);

    let list = app.list_lots("").await;
    assert!(lot_codes(&list.body).is_empty());

    let view = app
        .get(&format!("/api/v1/lots/{}", seeded.lot_id))
        .await;
    assert_eq!(view.body["progress"], 100);
}

#[tokio::test]
async fn split_batch_completes_only_after_every_child_is_packaged() {
    let app = TestApp::new().await;
    let source = app.seed_tank(TENANT, "BT-01", None).await;
    let tank_a = app.seed_tank(TENANT, "BT-02", None).await;
    let tank_b = app.seed_tank(TENANT, "BT-03", None).await;
    let seeded = app
        .seed_lot(TENANT, "L-250", 1000.0, LotPhase::Bright, &source, None)
        .await;

    let split = app
        .post(
            "/api/v1/lots/split",
            json!({
                "source_lot_id": seeded.lot_id,
                "targets": [
                    { "tank_id": tank_a.id, "volume": 400.0 },
                    { "tank_id": tank_b.id, "volume": 600.0 }
                ]
            }),
        )
        .await;
    assert_eq!(split.status, StatusCode::OK, "{}", split.body);

    let first = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_number": "L-250-A",
                "package_type": "KEG_50L",
                "quantity": 8
            }),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["lot_completed"], true);
    assert_eq!(first.body["completed_batch_ids"], json!([]));
    let batch = app.find_batch(seeded.batch_id).await;
    assert_eq!(batch.status, "PACKAGING");
    assert!(batch.completed_at.is_none());

    let second = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_number": "L-250-B",
                "package_type": "KEG_50L",
                "quantity": 12
            }),
        )
        .await;
    assert_eq!(second.status, StatusCode::OK, "{}", second.body);
    assert_eq!(second.body["lot_completed"], true);
    assert_eq!(
        second.body["completed_batch_ids"],
        json!([seeded.batch_id])
    );

    let batch = app.find_batch(seeded.batch_id).await;
    assert_eq!(batch.status, "COMPLETED");
    assert!((batch.packaged_volume - 1000.0).abs() < 1e-6);
}

#[tokio::test]
async fn packaged_blend_completes_every_contributing_batch() {
    let app = TestApp::new().await;
    let tank_1 = app.seed_tank(TENANT, "BT-01", None).await;
    let tank_2 = app.seed_tank(TENANT, "BT-02", None).await;
    let target = app.seed_tank(TENANT, "T-05", None).await;
    let first = app
        .seed_lot(TENANT, "L-260", 500.0, LotPhase::Bright, &tank_1, None)
        .await;
    let second = app
        .seed_lot(TENANT, "L-261", 300.0, LotPhase::Bright, &tank_2, None)
        .await;

    let blend = app
        .post(
            "/api/v1/lots/blend",
            json!({
                "source_lot_ids": [first.lot_id, second.lot_id],
                "target_tank_id": target.id
            }),
        )
        .await;
    assert_eq!(blend.status, StatusCode::OK, "{}", blend.body);
    let blend_id = blend.body["lot_id"].as_str().expect("blend id").to_string();

    let partial = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_id": blend_id,
                "package_type": "KEG_50L",
                "quantity": 8
            }),
        )
        .await;
    assert_eq!(partial.status, StatusCode::OK, "{}", partial.body);
    assert_eq!(partial.body["lot_completed"], false);
    for source in [&first, &second] {
        assert_eq!(app.find_batch(source.batch_id).await.status, "PACKAGING");
    }

    let rest = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_id": blend_id,
                "package_type": "KEG_50L",
                "quantity": 8
            }),
        )
        .await;
    assert_eq!(rest.status, StatusCode::OK, "{}", rest.body);
    assert_eq!(rest.body["lot_completed"], true);
    let mut completed: Vec<String> = rest.body["completed_batch_ids"]
        .as_array()
        .expect("completed batch ids")
        .iter()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect();
    completed.sort();
    let mut expected = vec![first.batch_id.to_string(), second.batch_id.to_string()];
    expected.sort();
    assert_eq!(completed, expected);

    for source in [&first, &second] {
        assert_eq!(app.find_batch(source.batch_id).await.status, "COMPLETED");
    }
    assert!(app.find_tank(target.id).await.current_lot_id.is_none());
}

#[tokio::test]
async fn every_packaging_run_bumps_the_lot_version() {
    let app = TestApp::new().await;
    let tank_1 = app.seed_tank(TENANT, "BT-01", None).await;
    let tank_2 = app.seed_tank(TENANT, "BT-02", None).await;
    let first = app
        .seed_lot(TENANT, "L-270", 600.0, LotPhase::Bright, &tank_1, None)
        .await;
    let second = app
        .seed_lot(TENANT, "L-271", 400.0, LotPhase::Bright, &tank_2, None)
        .await;
    let blend = app
        .post(
            "/api/v1/lots/blend",
            json!({
                "source_lot_ids": [first.lot_id, second.lot_id],
                "target_tank_id": tank_1.id
            }),
        )
        .await;
    assert_eq!(blend.status, StatusCode::OK, "{}", blend.body);
    let blend_id: uuid::Uuid = blend.body["lot_id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("blend id");

    // Runs that name only the minor batch still write the lot row.
    let run = json!({
        "lot_id": blend_id,
        "batch_ids": [second.batch_id],
        "package_type": "KEG_20L",
        "quantity": 2
    });
    let mut version = app.find_lot(blend_id).await.version;
    for _ in 0..3 {
        let res = app.post("/api/v1/packaging", run.clone()).await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        let lot = app.find_lot(blend_id).await;
        assert_eq!(lot.phase.as_deref(), Some("PACKAGING"));
        assert_eq!(lot.version, version + 1);
        version = lot.version;
    }
}

#[tokio::test]
async fn packaging_beyond_available_volume_is_rejected_without_a_run() {
    let app = TestApp::new().await;
    let tank = app.seed_tank(TENANT, "BT-01", None).await;
    let seeded = app
        .seed_lot(TENANT, "L-300", 500.0, LotPhase::Bright, &tank, None)
        .await;

    let res = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_id": seeded.lot_id,
                "package_type": "KEG_50L",
                "quantity": 14
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", res.body);
    assert_eq!(res.body["code"], "INSUFFICIENT_VOLUME");
    assert!(approx(&res.body["details"]["available_volume"], 500.0));
    assert!(approx(&res.body["details"]["requested_volume"], 700.0));
    assert_eq!(res.body["retryable"], false);

    let runs = packaging_run::Entity::find()
        .count(app.db())
        .await
        .expect("count runs");
    assert_eq!(runs, 0);

    let batch = app.find_batch(seeded.batch_id).await;
    assert_eq!(batch.status, "READY");
}

#[tokio::test]
async fn completed_lot_rejects_packaging_and_further_transitions() {
    let app = TestApp::new().await;
    let tank = app.seed_tank(TENANT, "BT-01", None).await;
    let seeded = app
        .seed_lot(TENANT, "L-400", 200.0, LotPhase::Bright, &tank, None)
        .await;

    let done = app
        .post(
            &format!("/api/v1/lots/{}/complete", seeded.lot_id),
            json!({ "reason": "dumped" }),
        )
        .await;
    assert_eq!(done.status, StatusCode::OK, "{}", done.body);
    assert_eq!(done.body["released_tank_ids"], json!([tank.id]));

    let package = app
        .post(
            "/api/v1/packaging",
            json!({
                "lot_id": seeded.lot_id,
                "package_type": "KEG_20L",
                "quantity": 1
            }),
        )
        .await;
    assert_eq!(package.status, StatusCode::CONFLICT);
    assert_eq!(package.body["code"], "INVALID_STATE");

    let again = app
        .request_as(
            Some(TENANT),
            Method::POST,
            &format!("/api/v1/lots/{}/complete", seeded.lot_id),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let advance = app
        .request_as(
            Some(TENANT),
            Method::POST,
            &format!("/api/v1/lots/{}/advance", seeded.lot_id),
            None,
        )
        .await;
    assert_eq!(advance.status, StatusCode::CONFLICT);

    // Completion keeps the phase the lot was in.
    let lot = app.find_lot(seeded.lot_id).await;
    assert_eq!(lot.phase.as_deref(), Some("BRIGHT"));
}

#[tokio::test]
async fn packaged_volume_only_grows_across_runs() {
    let app = TestApp::new().await;
    let tank = app.seed_tank(TENANT, "BT-01", None).await;
    let seeded = app
        .seed_lot(TENANT, "L-500", 100.0, LotPhase::Bright, &tank, None)
        .await;

    let mut last = 0.0;
    for quantity in [1, 2, 1] {
        let res = app
            .post(
                "/api/v1/packaging",
                json!({
                    "batch_id": seeded.batch_id,
                    "package_type": "KEG_20L",
                    "quantity": quantity
                }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        let used = res.body["volume_info"]["used_volume"]
            .as_f64()
            .expect("used volume");
        assert!(used > last);
        last = used;

        let volume = app
            .get(&format!("/api/v1/lots/{}/volume", seeded.lot_id))
            .await;
        assert!(approx(&volume.body["used_volume"], used));
    }
    assert!((last - 80.0).abs() < 1e-6);
}

#[tokio::test]
async fn tenants_never_see_each_others_lots() {
    let app = TestApp::new().await;
    let tank = app.seed_tank(TENANT, "FV-01", None).await;
    let other_tank = app.seed_tank(OTHER_TENANT, "FV-01", None).await;
    let mine = app
        .seed_lot(TENANT, "L-600", 700.0, LotPhase::Fermentation, &tank, None)
        .await;
    app.seed_lot(OTHER_TENANT, "L-600", 900.0, LotPhase::Fermentation, &other_tank, None)
        .await;

    let list = app.list_lots("").await;
    assert_eq!(list.body["count"], 1);
    assert!(approx(&list.body["lots"][0]["total_volume"], 700.0));

    let foreign = app
        .request_as(
            Some(OTHER_TENANT),
            Method::GET,
            &format!("/api/v1/lots/{}", mine.lot_id),
            None,
        )
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
    assert_eq!(foreign.body["code"], "NOT_FOUND");

    let foreign_package = app
        .request_as(
            Some(OTHER_TENANT),
            Method::POST,
            "/api/v1/packaging",
            Some(json!({
                "lot_id": mine.lot_id,
                "package_type": "KEG_20L",
                "quantity": 1
            })),
        )
        .await;
    assert_eq!(foreign_package.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_without_tenant_are_unauthorized() {
    let app = TestApp::new().await;

    let res = app
        .request_as(None, Method::GET, "/api/v1/lots", None)
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "UNAUTHORIZED");
    assert!(res.body["request_id"].is_string());
}

#[tokio::test]
async fn list_filters_by_phase_and_reports_stats() {
    let app = TestApp::new().await;
    let t1 = app.seed_tank(TENANT, "FV-01", None).await;
    let t2 = app.seed_tank(TENANT, "FV-02", None).await;
    let t3 = app.seed_tank(TENANT, "BT-01", None).await;
    app.seed_lot(TENANT, "L-701", 100.0, LotPhase::Fermentation, &t1, None)
        .await;
    app.seed_lot(TENANT, "L-702", 200.0, LotPhase::Fermentation, &t2, None)
        .await;
    app.seed_lot(TENANT, "L-703", 300.0, LotPhase::Bright, &t3, None)
        .await;

    let all = app.list_lots("").await;
    assert_eq!(all.body["stats"]["total"], 3);
    assert_eq!(all.body["stats"]["by_phase"]["FERMENTATION"], 2);
    assert_eq!(all.body["stats"]["by_phase"]["BRIGHT"], 1);
    assert_eq!(all.body["stats"]["by_type"]["single"], 3);
    assert!(approx(&all.body["stats"]["total_volume"], 600.0));

    let fermenting = app.list_lots("phase=FERMENTATION").await;
    let mut codes = lot_codes(&fermenting.body);
    codes.sort();
    assert_eq!(codes, vec!["L-701", "L-702"]);
    assert_eq!(fermenting.body["lots"][0]["progress"], 40);

    let limited = app.list_lots("limit=1").await;
    assert_eq!(limited.body["count"], 1);
    assert_eq!(limited.body["stats"]["total"], 3);

    let by_code = app.list_lots("lot_number=L-703").await;
    assert_eq!(lot_codes(&by_code.body), vec!["L-703"]);

    let bad = app.list_lots("phase=BOILING").await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}
