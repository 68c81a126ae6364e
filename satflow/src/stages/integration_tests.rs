//! End-to-end stage scenarios over in-memory stores, driven through the
//! runner's wire interface the way the orchestrator drives them.

#[cfg(test)]
mod tests {
    use crate::core::StageOutcome;
    use crate::events::{CollectingEventSink, NotificationKind};
    use crate::params::InMemoryParameterStore;
    use crate::plugins::PluginRegistry;
    use crate::runner::StageRunner;
    use crate::stages::StageKind;
    use crate::storage::MemoryObjectStore;
    use crate::testing::fixtures::{
        self, ARTIFACTS_BUCKET, CANONICAL_BUCKET, COLD_BUCKET, GRIDS_BUCKET, HIGH_WATER_MARK,
        LATEST_AVAILABLE, PARAMS_BUCKET, SOURCE_BUCKET,
    };
    use crate::testing::{assert_wire_status, FixedProcessor, RecordingExtractor};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Harness {
        runner: StageRunner,
        store: Arc<MemoryObjectStore>,
        params: Arc<InMemoryParameterStore>,
        sink: Arc<CollectingEventSink>,
    }

    fn harness_with(plugins: PluginRegistry) -> Harness {
        let (ports, store, params) = fixtures::memory_ports();
        let sink = Arc::new(CollectingEventSink::new());
        let runner = StageRunner::new(ports.with_plugins(plugins))
            .with_clock(Arc::new(fixtures::clock()))
            .with_events(sink.clone());
        Harness {
            runner,
            store,
            params,
            sink,
        }
    }

    fn harness() -> Harness {
        harness_with(PluginRegistry::new())
    }

    fn seed_source(store: &MemoryObjectStore) {
        for part in 1..=3 {
            store.insert(
                SOURCE_BUCKET,
                &format!("ABI-L1b-RadF/2024/001/00/goes16_rad_202401010010_c{part}.nc"),
                Bytes::from_static(b"rad"),
            );
        }
        for ts in ["202401010000", "202401010010"] {
            store.insert(
                SOURCE_BUCKET,
                &format!("ABI-L2-ACMF/2024/001/00/goes16_clm_{ts}.nc"),
                Bytes::from_static(b"clm"),
            );
        }
        store.insert(
            SOURCE_BUCKET,
            "ABI-L2-ACMF/2024/001/00/goes16_ctp_202401010010.nc",
            Bytes::from_static(b"other product"),
        );
    }

    fn seed_grids(store: &MemoryObjectStore) {
        for kind in ["geolocation", "scan_time_offset", "vaa", "vza"] {
            store.insert(
                GRIDS_BUCKET,
                &format!("main/sih_lion/static_grids/satellite/goes16/{kind}/{kind}_v1.npy"),
                Bytes::from_static(b"grid"),
            );
        }
    }

    fn status(event: &Value) -> &str {
        event["status"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_batch_flows_from_poll_to_archive() {
        let processor = Arc::new(FixedProcessor::new("csa_202401010010.nc", &["aod.json"]));
        let h = harness_with(
            PluginRegistry::new().with_processor(fixtures::SOURCE, processor.clone()),
        );
        seed_source(&h.store);
        seed_grids(&h.store);
        h.store.insert(
            ARTIFACTS_BUCKET,
            "csa/dev/goes16/2023-12-31/csa_202312312350.nc",
            Bytes::from_static(b"yesterday"),
        );
        let trigger = json!({"source": "aws.events", "detail-type": "Scheduled Event"});

        let polled = h.runner.run(StageKind::Poll, trigger.clone()).await;
        assert_wire_status(&polled, StageOutcome::Success);
        assert_eq!(h.store.keys(CANONICAL_BUCKET).len(), 5);

        let latest = h.runner.run(StageKind::Latest, trigger.clone()).await;
        assert_wire_status(&latest, StageOutcome::Success);
        assert_eq!(latest["satflow"]["csa_timestamp"], "202401010010");
        assert_eq!(
            latest["satflow"]["data_service_s3_uri_props"]["rad"],
            json!(["s3://sat-canonical/acme/goes16/rad/", "202401010010"])
        );

        let available = h.runner.run(StageKind::Available, latest).await;
        assert_wire_status(&available, StageOutcome::Success);
        assert_eq!(available["event"], trigger);
        assert_eq!(
            available["satflow"]["data_service_files"]["rad"]
                .as_array()
                .map(Vec::len),
            Some(3)
        );

        let processed = h.runner.run(StageKind::Process, available).await;
        assert_wire_status(&processed, StageOutcome::Success);
        assert!(h
            .store
            .contains(ARTIFACTS_BUCKET, "csa/dev/goes16/2024-01-01/csa_202401010010.nc"));
        assert!(h.store.contains(PARAMS_BUCKET, "params/aod.json"));
        let inputs = processor.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].data_files["clm"].len(), 1);
        assert_eq!(inputs[0].static_grids.len(), 4);
        assert!(inputs[0].prior_artifacts.yesterday.is_some());
        assert!(inputs[0].prior_artifacts.today.is_none());

        let archived = h.runner.run(StageKind::Archive, trigger).await;
        assert_wire_status(&archived, StageOutcome::Success);
        assert_eq!(
            h.store.keys(COLD_BUCKET),
            vec!["csa/dev/goes16/2023-12-31/csa_202312312350.nc".to_string()]
        );

        assert_eq!(h.sink.of_kind(NotificationKind::StageStarted).len(), 5);
        assert_eq!(h.sink.of_kind(NotificationKind::MarkAdvanced).len(), 1);
        assert_eq!(h.sink.of_kind(NotificationKind::TimestampClaimed).len(), 1);
        assert_eq!(h.sink.of_kind(NotificationKind::ArtifactArchived).len(), 1);
    }

    #[tokio::test]
    async fn test_poll_twice_copies_nothing_new() {
        let h = harness();
        seed_source(&h.store);

        let first = h.runner.run(StageKind::Poll, json!({})).await;
        let copies = h.store.copy_calls();
        let second = h.runner.run(StageKind::Poll, json!({})).await;

        assert_eq!(first["responses"]["poll"]["copied"].as_array().map(Vec::len), Some(5));
        assert_eq!(first["responses"]["poll"]["filtered"], 1);
        assert_eq!(h.store.copy_calls(), copies);
        assert_eq!(second["responses"]["poll"]["copied"], json!([]));
        assert_eq!(second["responses"]["poll"]["skipped"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_reconciles_mixed_cadences() {
        let h = harness();
        fixtures::seed_rad(&h.store, "202401010010", 1);
        fixtures::seed_rad(&h.store, "202401010020", 1);
        fixtures::seed_clm(&h.store, "202401010000");
        fixtures::seed_clm(&h.store, "202401010010");

        let output = h.runner.run(StageKind::Latest, json!({})).await;

        assert_wire_status(&output, StageOutcome::Success);
        assert_eq!(output["satflow"]["csa_timestamp"], "202401010010");
        assert_eq!(
            h.params.value(HIGH_WATER_MARK).as_deref(),
            Some(r#"{"clm":"202401010010","rad":"202401010010"}"#)
        );
    }

    #[tokio::test]
    async fn test_reconcile_refuses_when_a_mark_is_already_there() {
        let h = harness();
        h.params.seed(HIGH_WATER_MARK, r#"{"rad":"202401010000","clm":"202401010010"}"#);
        fixtures::seed_rad(&h.store, "202401010010", 1);
        fixtures::seed_rad(&h.store, "202401010020", 1);
        fixtures::seed_clm(&h.store, "202401010000");
        fixtures::seed_clm(&h.store, "202401010010");

        let output = h.runner.run(StageKind::Latest, json!({})).await;

        assert_wire_status(&output, StageOutcome::Retryable);
        assert_eq!(h.params.write_count(HIGH_WATER_MARK), 0);
    }

    #[tokio::test]
    async fn test_disjoint_services_leave_mark_untouched() {
        let h = harness();
        h.params.seed(HIGH_WATER_MARK, r#"{"rad":"202312312300","clm":"202312312300"}"#);
        fixtures::seed_rad(&h.store, "202401010010", 1);
        fixtures::seed_clm(&h.store, "202401010000");

        let output = h.runner.run(StageKind::Latest, json!({})).await;

        assert_wire_status(&output, StageOutcome::Retryable);
        assert_eq!(output["responses"]["error_code"], "RECONCILIATION_IMPOSSIBLE");
        assert_eq!(
            h.params.value(HIGH_WATER_MARK).as_deref(),
            Some(r#"{"rad":"202312312300","clm":"202312312300"}"#)
        );
    }

    #[tokio::test]
    async fn test_high_water_mark_never_regresses() {
        let h = harness();
        for ts in ["202401010000", "202401010010"] {
            fixtures::seed_rad(&h.store, ts, 1);
            fixtures::seed_clm(&h.store, ts);
        }
        h.params.seed(HIGH_WATER_MARK, r#"{"rad":"202401010000","clm":"202401010000"}"#);
        assert_eq!(status(&h.runner.run(StageKind::Latest, json!({})).await), "SUCCEEDED");

        // Redrive of the earlier step after the mark moved on.
        let again = h.runner.run(StageKind::Latest, json!({})).await;

        assert_eq!(status(&again), "FAILED");
        assert_eq!(
            h.params.history(HIGH_WATER_MARK),
            vec![r#"{"clm":"202401010010","rad":"202401010010"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_gate_waits_for_files_then_succeeds() {
        let h = harness();
        fixtures::seed_rad(&h.store, "202401010010", 1);
        fixtures::seed_rad(&h.store, "202401010010", 2);
        fixtures::seed_clm(&h.store, "202401010010");
        let input = fixtures::latest_output("202401010010");

        let first = h.runner.run(StageKind::Available, input.clone()).await;
        assert_wire_status(&first, StageOutcome::Retryable);
        assert_eq!(first["responses"]["file_counts"], json!({"clm": 1, "rad": 2}));

        let second = h.runner.run(StageKind::Available, input.clone()).await;
        assert_wire_status(&second, StageOutcome::Retryable);
        assert_eq!(h.params.write_count(LATEST_AVAILABLE), 1);

        fixtures::seed_rad(&h.store, "202401010010", 3);
        let third = h.runner.run(StageKind::Available, input).await;

        assert_wire_status(&third, StageOutcome::Success);
        let files = &third["satflow"]["data_service_files"];
        assert_eq!(files["rad"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            files["clm"],
            json!([format!("{CANONICAL_BUCKET}/{}", fixtures::clm_key("202401010010"))])
        );
        assert_eq!(h.params.write_count(LATEST_AVAILABLE), 1);
    }

    #[tokio::test]
    async fn test_gate_bombs_out_behind_newer_claim() {
        let h = harness();
        h.params.seed(LATEST_AVAILABLE, r#"{"rad":"202401010020","clm":"202401010020"}"#);

        let output = h
            .runner
            .run(StageKind::Available, fixtures::latest_output("202401010010"))
            .await;

        assert_wire_status(&output, StageOutcome::Terminal);
        assert_eq!(output["responses"]["error_code"], "STALENESS_DETECTED");
        assert_eq!(h.params.write_count(LATEST_AVAILABLE), 0);
        assert_eq!(h.sink.of_kind(NotificationKind::BombOut).len(), 1);
    }

    #[tokio::test]
    async fn test_gate_accepts_redrive_envelope() {
        let h = harness();
        for part in 1..=3 {
            fixtures::seed_rad(&h.store, "202401010010", part);
        }
        fixtures::seed_clm(&h.store, "202401010010");
        let redriven = json!({
            "status": "FAILED",
            "event": fixtures::latest_output("202401010010"),
        });

        let output = h.runner.run(StageKind::Available, redriven).await;

        assert_wire_status(&output, StageOutcome::Success);
    }

    #[tokio::test]
    async fn test_gate_retries_from_its_own_failed_output() {
        let h = harness();
        fixtures::seed_rad(&h.store, "202401010010", 1);
        fixtures::seed_clm(&h.store, "202401010010");

        let first = h
            .runner
            .run(StageKind::Available, fixtures::latest_output("202401010010"))
            .await;
        assert_wire_status(&first, StageOutcome::Retryable);
        assert_eq!(first["event"]["satflow"]["csa_timestamp"], "202401010010");

        let second = h.runner.run(StageKind::Available, first.clone()).await;
        assert_wire_status(&second, StageOutcome::Retryable);
        assert_eq!(second["event"], first["event"]);

        fixtures::seed_rad(&h.store, "202401010010", 2);
        fixtures::seed_rad(&h.store, "202401010010", 3);
        let third = h.runner.run(StageKind::Available, second).await;

        assert_wire_status(&third, StageOutcome::Success);
        assert_eq!(third["satflow"]["csa_timestamp"], "202401010010");
        assert_eq!(third["event"], json!({}));
        assert_eq!(h.params.write_count(LATEST_AVAILABLE), 1);
    }

    #[tokio::test]
    async fn test_gate_bomb_out_output_can_be_resubmitted() {
        let h = harness();
        h.params.seed(LATEST_AVAILABLE, r#"{"rad":"202401010020","clm":"202401010020"}"#);

        let first = h
            .runner
            .run(StageKind::Available, fixtures::latest_output("202401010010"))
            .await;
        assert_wire_status(&first, StageOutcome::Terminal);
        assert_eq!(first["event"]["satflow"]["csa_timestamp"], "202401010010");

        let again = h.runner.run(StageKind::Available, first).await;

        assert_wire_status(&again, StageOutcome::Terminal);
        assert_eq!(again["responses"]["error_code"], "STALENESS_DETECTED");
        assert_eq!(h.params.write_count(LATEST_AVAILABLE), 0);
    }

    #[tokio::test]
    async fn test_extract_without_grid_skips() {
        let extractor = Arc::new(RecordingExtractor::new());
        let h = harness_with(
            PluginRegistry::new().with_extractor(fixtures::SOURCE, extractor.clone()),
        );
        h.store.insert(
            SOURCE_BUCKET,
            "incoming/goes16_rad_202401010010_c1.nc",
            Bytes::from_static(b"raw"),
        );
        h.store.insert(
            GRIDS_BUCKET,
            "main/sih_lion/static_grids/extractor/goes16/sg_clm_goes16_v1.nc",
            Bytes::from_static(b"grid"),
        );
        let event = json!({
            "detail": {
                "bucket": {"name": SOURCE_BUCKET},
                "object": {"key": "incoming/goes16_rad_202401010010_c1.nc"}
            }
        });

        let skipped = h.runner.run(StageKind::Extract, event.clone()).await;
        assert_wire_status(&skipped, StageOutcome::Skipped);
        assert!(extractor.calls().is_empty());

        h.store.insert(
            GRIDS_BUCKET,
            "main/sih_lion/static_grids/extractor/goes16/sg_rad_goes16_v1.nc",
            Bytes::from_static(b"grid"),
        );
        let extracted = h.runner.run(StageKind::Extract, event).await;
        assert_wire_status(&extracted, StageOutcome::Success);
        assert_eq!(
            extractor.calls(),
            vec![(
                "goes16_rad_202401010010_c1.nc".to_string(),
                "sg_rad_goes16_v1.nc".to_string()
            )]
        );
    }
}
