mod common;

#[cfg(test)]
mod tests {
    use super::common::{
        Behavior, FakeServer, masterlist_body, mount_masterlist, random_records, test_config,
    };
    use samp_directory::{
        CycleOutcome, RefreshEngine, RefreshErr, RefreshState, ServerRecord,
        engine::masterlist::BROWSER_USER_AGENT,
        store::{DirectoryStore, JsonFileStore, MemoryStore, StoreErr},
    };

    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn memory_engine(masterlists: Vec<String>) -> RefreshEngine<MemoryStore> {
        RefreshEngine::new(MemoryStore::new(), test_config(masterlists)).unwrap()
    }

    fn published(outcome: CycleOutcome) -> samp_directory::CycleReport {
        match outcome {
            CycleOutcome::Published(report) => report,
            other => panic!("expected a published cycle, got: {other:?}"),
        }
    }

    async fn wait_for_idle<S: DirectoryStore>(engine: &RefreshEngine<S>) {
        for _ in 0..100 {
            if engine.state() == RefreshState::Idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("refresh did not finish");
    }

    #[tokio::test]
    async fn duplicate_lines_are_queried_once() {
        let server = FakeServer::spawn(Behavior::Full, "Scenario A").await;
        let lists = MockServer::start().await;
        let body = format!("{0}\n{0}\nnot-a-line", server.line());
        let url = mount_masterlist(&lists, "/masterlist.txt", body).await;

        let engine = memory_engine(vec![url]);
        let report = published(engine.run_cycle().await);

        assert_eq!(report.entries, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.responded, 1);
        assert_eq!(report.published, 1);
        assert_eq!(server.info_requests(), 1);

        let snapshot = engine.current();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.find("127.0.0.1", server.addr.port()).unwrap();
        assert_eq!(record.hostname, "Scenario A");
        assert_eq!(record.weather, 10);
        assert_eq!(engine.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn partial_responses_are_dropped() {
        let first = FakeServer::spawn(Behavior::Full, "First").await;
        let info_only = FakeServer::spawn(Behavior::InfoOnly, "Info only").await;
        let last = FakeServer::spawn(Behavior::Full, "Last").await;

        let lists = MockServer::start().await;
        let url = mount_masterlist(
            &lists,
            "/masterlist.txt",
            masterlist_body(&[&first, &info_only, &last]),
        )
        .await;

        let engine = memory_engine(vec![url]);
        let report = published(engine.run_cycle().await);

        assert_eq!(report.unresponsive.timed_out, 1);
        assert_eq!(report.responded, 2);

        let hostnames = engine
            .current()
            .iter()
            .map(|record| record.hostname.clone())
            .collect::<Vec<_>>();
        assert_eq!(hostnames, ["First", "Last"]);
        assert_eq!(engine.store().len(), 2);
    }

    #[tokio::test]
    async fn failing_hosts_never_reach_the_directory() {
        let ok = FakeServer::spawn(Behavior::Full, "Ok").await;
        let silent = FakeServer::spawn(Behavior::Silent, "Silent").await;
        let garbage = FakeServer::spawn(Behavior::Garbage, "Garbage").await;
        let bad_weather = FakeServer::spawn(Behavior::BadWeather, "Bad weather").await;

        let lists = MockServer::start().await;
        let url = mount_masterlist(
            &lists,
            "/masterlist.txt",
            masterlist_body(&[&silent, &garbage, &ok, &bad_weather]),
        )
        .await;

        let engine = memory_engine(vec![url]);
        let report = published(engine.run_cycle().await);

        assert_eq!(report.unresponsive.timed_out, 1);
        assert_eq!(report.unresponsive.malformed, 2);
        assert_eq!(report.unresponsive.total(), 3);
        assert_eq!(report.published, 1);
        assert_eq!(engine.current().servers()[0].hostname, "Ok");
    }

    #[tokio::test]
    async fn same_host_on_two_sources_is_one_record() {
        let shared = FakeServer::spawn(Behavior::Full, "Shared").await;
        let other = FakeServer::spawn(Behavior::Full, "Other").await;

        let lists = MockServer::start().await;
        let first = mount_masterlist(&lists, "/masterlist.txt", masterlist_body(&[&shared])).await;
        let second =
            mount_masterlist(&lists, "/hostedlist.txt", masterlist_body(&[&other, &shared])).await;

        let engine = memory_engine(vec![first, second]);
        let report = published(engine.run_cycle().await);

        assert_eq!(report.sources_ok, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(shared.info_requests(), 1);

        let hostnames = engine
            .current()
            .iter()
            .map(|record| record.hostname.clone())
            .collect::<Vec<_>>();
        assert_eq!(hostnames, ["Shared", "Other"]);
    }

    #[tokio::test]
    async fn unavailable_source_does_not_stop_the_others() {
        let server = FakeServer::spawn(Behavior::Full, "Reachable").await;

        let lists = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&lists)
            .await;
        let down = format!("{}/down.txt", lists.uri());
        let up = mount_masterlist(&lists, "/up.txt", masterlist_body(&[&server])).await;

        let engine = memory_engine(vec![down, up]);
        let report = published(engine.run_cycle().await);

        assert_eq!(report.sources_ok, 1);
        assert_eq!(report.sources_failed, 1);
        assert_eq!(engine.current().len(), 1);
    }

    #[tokio::test]
    async fn masterlists_are_requested_as_a_browser() {
        let lists = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/masterlist.txt"))
            .and(header("User-Agent", BROWSER_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&lists)
            .await;

        let engine = memory_engine(vec![format!("{}/masterlist.txt", lists.uri())]);
        assert!(engine.run_cycle().await.is_published());
    }

    #[tokio::test]
    async fn no_usable_source_keeps_previous_snapshot() {
        let server = FakeServer::spawn(Behavior::Full, "Kept").await;

        let lists = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/masterlist.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(masterlist_body(&[&server])))
            .up_to_n_times(1)
            .mount(&lists)
            .await;
        Mock::given(method("GET"))
            .and(path("/masterlist.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&lists)
            .await;

        let engine = memory_engine(vec![format!("{}/masterlist.txt", lists.uri())]);
        published(engine.run_cycle().await);
        let before = engine.current();
        assert_eq!(before.len(), 1);

        let outcome = engine.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed(RefreshErr::AllSourcesUnavailable)
        ));
        assert!(Arc::ptr_eq(&before, &engine.current()));
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn no_sources_configured_fails() {
        let engine = memory_engine(Vec::new());
        assert!(matches!(
            engine.run_cycle().await,
            CycleOutcome::Failed(RefreshErr::AllSourcesUnavailable)
        ));
        assert!(engine.current().is_empty());
    }

    /// Delegates to a [`MemoryStore`] until told to fail writes
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl DirectoryStore for FlakyStore {
        async fn upsert_record(&self, record: ServerRecord) -> Result<(), StoreErr> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreErr::Unavailable("connection refused".into()));
            }
            self.inner.upsert_record(record).await
        }

        async fn clear_all(&self) -> Result<(), StoreErr> {
            self.inner.clear_all().await
        }

        async fn load_all(&self) -> Result<Vec<ServerRecord>, StoreErr> {
            self.inner.load_all().await
        }
    }

    #[tokio::test]
    async fn store_failure_keeps_previous_snapshot() {
        let server = FakeServer::spawn(Behavior::Full, "Persisted").await;
        let lists = MockServer::start().await;
        let url = mount_masterlist(&lists, "/masterlist.txt", masterlist_body(&[&server])).await;

        let engine = RefreshEngine::new(FlakyStore::default(), test_config(vec![url])).unwrap();
        published(engine.run_cycle().await);
        let before = engine.current();

        engine.store().fail_writes.store(true, Ordering::SeqCst);
        let outcome = engine.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed(RefreshErr::Store(_))));
        assert!(Arc::ptr_eq(&before, &engine.current()));
        assert_eq!(engine.state(), RefreshState::Idle);

        engine.store().fail_writes.store(false, Ordering::SeqCst);
        assert!(engine.run_cycle().await.is_published());
        assert!(!Arc::ptr_eq(&before, &engine.current()));
        assert_eq!(before.servers(), engine.current().servers());
    }

    #[tokio::test]
    async fn trigger_while_active_is_a_no_op() {
        let server = FakeServer::spawn(Behavior::Full, "Slow list").await;
        let lists = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/masterlist.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(masterlist_body(&[&server]))
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&lists)
            .await;

        let engine = Arc::new(memory_engine(vec![format!(
            "{}/masterlist.txt",
            lists.uri()
        )]));

        assert!(engine.trigger_refresh());
        assert_ne!(engine.state(), RefreshState::Idle);
        assert!(!engine.trigger_refresh());
        assert!(matches!(engine.run_cycle().await, CycleOutcome::Skipped));
        assert_eq!(engine.restore().await.unwrap(), None);

        wait_for_idle(&engine).await;

        assert_eq!(engine.current().len(), 1);
        assert_eq!(server.info_requests(), 1);
    }

    #[tokio::test]
    async fn empty_masterlist_publishes_empty_directory() {
        let lists = MockServer::start().await;
        let url = mount_masterlist(&lists, "/masterlist.txt", String::from("\n\n")).await;

        let store = MemoryStore::new();
        for record in random_records(3) {
            store.upsert_record(record).await.unwrap();
        }

        let engine = RefreshEngine::new(store, test_config(vec![url])).unwrap();
        assert_eq!(engine.restore().await.unwrap(), Some(3));
        assert_eq!(engine.current().len(), 3);

        let report = published(engine.run_cycle().await);
        assert_eq!(report.published, 0);
        assert!(engine.current().is_empty());
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn restore_publishes_stored_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.jsonl");
        let records = random_records(10);

        let store = JsonFileStore::new(&path);
        for record in records.iter().cloned() {
            store.upsert_record(record).await.unwrap();
        }

        let engine = RefreshEngine::new(JsonFileStore::new(&path), test_config(Vec::new())).unwrap();
        assert!(engine.current().is_empty());

        assert_eq!(engine.restore().await.unwrap(), Some(10));
        assert_eq!(engine.current().servers(), records.as_slice());
        assert_eq!(engine.state(), RefreshState::Idle);
    }
}
