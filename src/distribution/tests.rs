//! Distribution Module Tests
//!
//! ## Test Scopes
//! - **Partitioner**: Level buckets, coverage, bulk-file splitting.
//! - **Modifiers**: Local and remote processing, replica fan-out, callbacks.
//! - **Distributor**: Queue draining, buffer retry and merge, pause, worker
//!   thread lifecycle.
//!
//! *Note: The router is the in-memory `RecordingRouter`; HTTP delivery is
//! covered in the routing tests.*

#[cfg(test)]
mod tests {
    use crate::distribution::modifier::attempts::AttemptTable;
    use crate::distribution::partitioner::{is_owned, level_of, sort_by_level, sort_file_by_level};
    use crate::distribution::types::{
        DistributionAttempt, DistributionRequest, MessageId, Operation, Payload, RequestId,
    };
    use crate::index::local::INBOUND_FILE;
    use crate::index::types::{EntryId, IndexEntry, PeerInfo, TrieKey};
    use crate::storage::Table;
    use crate::storage::bulk::TransientFile;
    use crate::storage::lock::{FILE_LOCKS, FileAccess};
    use crate::test_support::{Outcome, TestNode, entry, key, sorted_ids};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn keys_of(entries: &[IndexEntry]) -> Vec<&str> {
        let mut keys: Vec<&str> = entries.iter().map(|e| e.key().as_str()).collect();
        keys.sort();
        keys
    }

    fn remote(operation: Operation, payload: Payload, via_replica: bool) -> DistributionRequest {
        DistributionRequest::remote(
            operation,
            payload,
            MessageId::new(),
            RequestId::new(),
            via_replica,
        )
    }

    fn scratch_files(node: &TestNode) -> usize {
        std::fs::read_dir(node.index.scratch_dir()).unwrap().count()
    }

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_sort_by_level_scenario() {
        let path = key("010");
        let batch = vec![
            entry("100", "diverges at 0"),
            entry("001", "diverges at 1"),
            entry("0101", "extends the path"),
            entry("011", "diverges at 2"),
            entry("01", "prefix of the path"),
        ];

        let levels = sort_by_level(&path, batch);

        assert_eq!(levels.len(), 4);
        assert_eq!(keys_of(&levels[0]), vec!["100"]);
        assert_eq!(keys_of(&levels[1]), vec!["001"]);
        assert_eq!(keys_of(&levels[2]), vec!["011"]);
        assert_eq!(keys_of(&levels[3]), vec!["01", "0101"]);
    }

    #[test]
    fn test_sort_by_level_total_coverage() {
        let path = key("0110");
        let batch: Vec<IndexEntry> = (0u32..64)
            .map(|i| entry(&format!("{:06b}", i), &format!("e{}", i)))
            .chain([entry("", "root"), entry("0", "short")])
            .collect();

        let levels = sort_by_level(&path, batch.clone());

        let flattened: Vec<IndexEntry> = levels.iter().flatten().cloned().collect();
        assert_eq!(flattened.len(), batch.len());
        assert_eq!(sorted_ids(&flattened), sorted_ids(&batch));

        for (level, bucket) in levels.iter().enumerate() {
            for e in bucket {
                if level == path.len() {
                    assert!(e.key().is_compatible_with(&path));
                } else {
                    // The entry belongs to the sibling subtree at `level`.
                    let branch = path.branch_at(level).unwrap();
                    assert!(branch.is_prefix_of(e.key()), "{} not under {}", e.key(), branch);
                }
            }
        }
    }

    #[test]
    fn test_empty_path_owns_everything() {
        let root = TrieKey::empty();

        assert_eq!(level_of(&root, &key("1011")), 0);
        assert!(is_owned(&root, &key("1011")));
        assert_eq!(sort_by_level(&root, vec![entry("1", "x")]).len(), 1);
    }

    #[test]
    fn test_sort_file_by_level_consumes_source() {
        let dir = TempDir::new().unwrap();
        let path = key("01");
        let source = TransientFile::create_in(dir.path()).unwrap();
        let batch: Vec<IndexEntry> = (0..1500)
            .map(|i| {
                let bits = ["1", "00", "01", "010"][i % 4];
                entry(bits, &format!("e{}", i))
            })
            .collect();
        source.append(&batch).unwrap();
        let source_path = source.path().to_path_buf();

        let levels = sort_file_by_level(&path, source, dir.path()).unwrap();

        assert!(!source_path.exists());
        assert_eq!(levels.len(), 3);

        let mut total = Vec::new();
        for file in levels.iter().flatten() {
            total.extend(file.entries().unwrap());
        }
        assert_eq!(sorted_ids(&total), sorted_ids(&batch));
        assert_eq!(levels[0].as_ref().unwrap().entries().unwrap().len(), 375);
        assert_eq!(levels[2].as_ref().unwrap().entries().unwrap().len(), 750);

        drop(levels);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sort_file_by_level_skips_empty_levels() {
        let dir = TempDir::new().unwrap();
        let source = TransientFile::create_in(dir.path()).unwrap();
        source.append(&[entry("11", "x")]).unwrap();

        let levels = sort_file_by_level(&key("10"), source, dir.path()).unwrap();

        assert!(levels[0].is_none());
        assert!(levels[1].is_some());
        assert!(levels[2].is_none());
    }

    // ============================================================
    // ATTEMPT TABLE TESTS
    // ============================================================

    #[test]
    fn test_attempt_completes_once() {
        let table = AttemptTable::new();
        let id = MessageId::new();
        let parent = RequestId::new();

        table.register(
            id.clone(),
            parent.clone(),
            DistributionAttempt {
                operation: Operation::Insert,
                payload: vec![entry("0", "a")],
                is_local: true,
            },
        );

        let (attempt, owner) = table.complete(&id).unwrap();
        assert_eq!(attempt.payload.len(), 1);
        assert_eq!(owner, Some(parent));
        assert!(table.complete(&id).is_none());
        assert!(table.is_empty());
    }

    // ============================================================
    // ENTRY MODIFIER TESTS
    // ============================================================

    #[test]
    fn test_non_super_peer_forwards_unsplit() {
        let node = TestNode::new("01", false);
        let batch = vec![entry("1", "a"), entry("010", "b")];

        node.distributor
            .submit(DistributionRequest::local(Operation::Insert, Payload::Entries(batch.clone())));
        node.distributor.run_cycle();

        let greedy = node.router.greedy();
        assert_eq!(greedy.len(), 1);
        assert_eq!(greedy[0].key, Some(TrieKey::empty()));
        assert_eq!(greedy[0].entries, batch);
        assert!(node.router.replicas().is_empty());
    }

    #[test]
    fn test_remote_arrival_resplits_with_own_path() {
        let node = TestNode::new("010", true);
        let batch = vec![entry("011", "sibling"), entry("0101", "mine")];

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(batch), false));
        node.distributor.run_cycle();

        let greedy = node.router.greedy();
        assert_eq!(greedy.len(), 1);
        assert_eq!(greedy[0].key, Some(key("011")));

        let replicas = node.router.replicas();
        assert_eq!(replicas.len(), 1);
        assert_eq!(keys_of(&replicas[0].entries), vec!["0101"]);

        // Inserts land in the inbound buffer and are merged at the end of
        // the cycle.
        assert!(!node.index.has_inbound());
        assert_eq!(keys_of(&node.index.canonical().get(None)), vec!["0101"]);
    }

    #[test]
    fn test_remote_arrival_keeps_sender_parent() {
        let node = TestNode::new("010", true);
        let parent = RequestId::new();
        let batch = vec![entry("011", "sibling"), entry("0101", "mine")];

        node.distributor.submit(DistributionRequest::remote(
            Operation::Insert,
            Payload::Entries(batch),
            MessageId::new(),
            parent.clone(),
            false,
        ));
        node.distributor.run_cycle();

        assert_eq!(node.router.greedy()[0].parent_id, parent);
        assert_eq!(node.router.replicas()[0].parent_id, parent);
    }

    #[test]
    fn test_local_request_is_its_own_parent() {
        let node = TestNode::new("0", true);
        let request = DistributionRequest::local(
            Operation::Insert,
            Payload::Entries(vec![entry("1", "foreign")]),
        );
        let id = request.id.clone();

        node.distributor.submit(request);
        node.distributor.run_cycle();

        assert_eq!(node.router.greedy()[0].parent_id, id);
    }

    #[test]
    fn test_replica_delivery_is_not_rebroadcast() {
        let node = TestNode::new("010", true);
        let batch = vec![entry("0101", "a"), entry("010", "b")];

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(batch.clone()), true));
        node.distributor.run_cycle();

        assert!(node.router.greedy().is_empty());
        assert!(node.router.replicas().is_empty());
        assert_eq!(sorted_ids(&node.index.canonical().get(None)), sorted_ids(&batch));
    }

    #[test]
    fn test_remote_delete() {
        let node = TestNode::new("0", true);
        let stored = entry("01", "a");
        node.index.add(&[stored.clone()]);

        node.distributor
            .submit(remote(Operation::Delete, Payload::Entries(vec![stored.clone()]), true));
        node.distributor.run_cycle();

        assert!(!node.index.canonical().contains(stored.id()));
    }

    #[test]
    fn test_remote_update_resubmits_moved_entries() {
        let node = TestNode::new("01", true);
        // Stored under 'A' = 01000001; the new payload '0' maps to 00110000.
        let stored = node.manager.create_entry("default", "A");
        node.index.add(&[stored.clone()]);
        let changed = stored.with_payload("0", stored.key().clone());

        node.distributor
            .submit(remote(Operation::Update, Payload::Entries(vec![changed]), false));
        node.distributor.run_cycle();

        assert!(!node.index.canonical().contains(stored.id()));
        assert_eq!(node.distributor.queues().len(), 1);

        node.distributor.run_cycle();

        let inserts: Vec<_> = node
            .router
            .greedy()
            .into_iter()
            .filter(|r| r.operation == Operation::Insert)
            .collect();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].key, Some(key("00")));
    }

    #[test]
    fn test_failed_delivery_is_requeued() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Fail);
        let foreign = entry("1", "unreachable");

        node.distributor
            .submit(remote(Operation::Delete, Payload::Entries(vec![foreign.clone()]), false));
        node.distributor.run_cycle();

        assert_eq!(node.distributor.entry_modifier().in_flight(), 0);
        assert_eq!(node.index.outbound_entries(Operation::Delete), vec![foreign]);
        assert!(node.index.outbound_entries(Operation::Insert).is_empty());
    }

    #[test]
    fn test_attempt_tracked_until_callback() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Hold);

        node.distributor.submit(DistributionRequest::local(
            Operation::Insert,
            Payload::Entries(vec![entry("1", "a")]),
        ));
        node.distributor.run_cycle();

        let id = node.router.greedy()[0].id.clone();
        assert!(node.distributor.entry_modifier().is_tracked(&id));
        assert_eq!(node.distributor.entry_modifier().in_flight(), 1);

        assert_eq!(node.router.release(true), 1);

        assert!(!node.distributor.entry_modifier().is_tracked(&id));
        assert!(!node.index.has_outbound());
    }

    #[test]
    fn test_failed_replica_broadcast_is_not_requeued() {
        let node = TestNode::new("0", true);
        node.router.set_replica_outcome(Outcome::Fail);

        node.distributor.submit(DistributionRequest::local(
            Operation::Insert,
            Payload::Entries(vec![entry("00", "a")]),
        ));
        node.distributor.run_cycle();

        assert_eq!(node.router.replicas().len(), 1);
        assert!(!node.index.has_outbound());
    }

    #[test]
    fn test_remote_insert_stores_free_form_payload() {
        let node = TestNode::new("0", true);
        let owned = entry("01", "Smith, John");

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(vec![owned.clone()]), false));
        node.distributor.run_cycle();

        assert_eq!(node.router.replicas()[0].entries, vec![owned.clone()]);
        assert_eq!(node.index.canonical().get_by_id(owned.id()), Some(owned));
    }

    #[test]
    fn test_replica_insert_keeps_type_name_with_colon() {
        let node = TestNode::new("0", true);
        let owned = IndexEntry::from_parts(
            EntryId::new(),
            key("01"),
            "doc:v2",
            PeerInfo::new("p0", "127.0.0.1:6000"),
            "x",
        );

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(vec![owned.clone()]), true));
        node.distributor.run_cycle();

        let stored = node.index.canonical().get_by_id(owned.id()).unwrap();
        assert_eq!(stored.type_name(), "doc:v2");
        assert_eq!(stored.payload(), "x");
    }

    #[test]
    fn test_failed_delivery_requeues_free_form_payload() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Fail);
        let foreign = entry("1", "a,b\nc");

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(vec![foreign.clone()]), false));
        node.distributor.run_cycle();

        assert_eq!(node.distributor.entry_modifier().in_flight(), 0);
        assert_eq!(node.index.outbound_entries(Operation::Insert), vec![foreign]);
    }

    #[test]
    fn test_failed_file_delivery_requeues_free_form_payload() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Fail);
        let file = TransientFile::create_in(node.index.scratch_dir()).unwrap();
        let foreign = entry("10", "Smith, John");
        file.append(&[foreign.clone()]).unwrap();

        node.distributor
            .submit(DistributionRequest::local(Operation::Insert, Payload::File(file)));
        node.distributor.run_cycle();

        assert_eq!(node.router.greedy()[0].entries, vec![foreign.clone()]);
        assert_eq!(node.index.outbound_entries(Operation::Insert), vec![foreign]);
    }

    // ============================================================
    // FILE MODIFIER TESTS
    // ============================================================

    #[test]
    fn test_file_request_releases_every_file() {
        let node = TestNode::new("01", true);
        let file = TransientFile::create_in(node.index.scratch_dir()).unwrap();
        file.append(&[entry("1", "a"), entry("00", "b"), entry("011", "c")])
            .unwrap();

        node.distributor
            .submit(DistributionRequest::local(Operation::Insert, Payload::File(file)));
        node.distributor.run_cycle();

        let greedy = node.router.greedy();
        assert_eq!(greedy.len(), 2);
        assert!(greedy.iter().all(|r| r.from_file));
        assert_eq!(node.router.replicas().len(), 1);
        assert_eq!(scratch_files(&node), 0);
    }

    #[test]
    fn test_held_file_attempt_keeps_file_until_failure() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Hold);
        let file = TransientFile::create_in(node.index.scratch_dir()).unwrap();
        let foreign = entry("10", "a");
        file.append(&[foreign.clone()]).unwrap();

        node.distributor
            .submit(DistributionRequest::local(Operation::Update, Payload::File(file)));
        node.distributor.run_cycle();

        assert_eq!(node.distributor.file_modifier().in_flight(), 1);
        assert_eq!(scratch_files(&node), 1);

        node.router.release(false);

        assert_eq!(node.distributor.file_modifier().in_flight(), 0);
        assert_eq!(scratch_files(&node), 0);
        assert_eq!(node.index.outbound_entries(Operation::Update), vec![foreign]);
    }

    #[test]
    fn test_remote_file_replica_delivery_applies_locally() {
        let node = TestNode::new("1", true);
        let file = TransientFile::create_in(node.index.scratch_dir()).unwrap();
        let owned = entry("11", "a");
        file.append(&[owned.clone()]).unwrap();

        node.distributor
            .submit(remote(Operation::Insert, Payload::File(file), true));
        node.distributor.run_cycle();

        assert!(node.router.greedy().is_empty());
        assert!(node.router.replicas().is_empty());
        assert!(node.index.canonical().contains(owned.id()));
        assert_eq!(scratch_files(&node), 0);
    }

    // ============================================================
    // DISTRIBUTOR TESTS
    // ============================================================

    #[test]
    fn test_outbound_buffer_retried_as_bulk_file() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Fail);
        node.distributor.submit(DistributionRequest::local(
            Operation::Insert,
            Payload::Entries(vec![entry("1", "a")]),
        ));
        node.distributor.run_cycle();
        assert!(node.index.has_outbound());

        node.router.set_outcome(Outcome::Finish);
        node.router.clear();
        std::thread::sleep(Duration::from_millis(250));
        assert!(node.distributor.has_work());
        node.distributor.run_cycle();

        let greedy = node.router.greedy();
        assert_eq!(greedy.len(), 1);
        assert!(greedy[0].from_file);
        assert_eq!(greedy[0].operation, Operation::Insert);
        assert!(!node.index.has_outbound());
        assert!(!node.distributor.has_work());
    }

    #[test]
    fn test_retry_waits_for_idle_poll() {
        let node = TestNode::new("0", true);
        node.router.set_outcome(Outcome::Fail);
        node.index
            .append_outbound(Operation::Insert, &[entry("1", "a")])
            .unwrap();

        node.distributor.run_cycle();
        node.router.clear();

        // Failed again; the next retry is not due yet.
        assert!(node.index.has_outbound());
        assert!(!node.distributor.has_work());
        node.distributor.run_cycle();
        assert!(node.router.greedy().is_empty());
    }

    #[test]
    fn test_pause_gates_work() {
        let node = TestNode::new("", true);
        node.distributor.submit(DistributionRequest::local(
            Operation::Insert,
            Payload::Entries(vec![entry("0", "a")]),
        ));

        node.distributor.pause();
        assert!(!node.distributor.has_work());
        assert_eq!(node.distributor.queues().len(), 1);

        node.distributor.resume();
        assert!(node.distributor.has_work());
    }

    #[test]
    fn test_worker_thread_drains_and_merges() {
        let node = TestNode::new("1", true);
        let owned = entry("10", "a");
        node.distributor.start().unwrap();

        node.distributor
            .submit(remote(Operation::Insert, Payload::Entries(vec![owned.clone()]), true));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !node.index.canonical().contains(owned.id()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        node.distributor.shutdown();

        assert!(node.index.canonical().contains(owned.id()));
        assert!(node.distributor.queues().is_empty());
    }

    #[test]
    fn test_submit_does_not_wait_for_buffer_scan() {
        let node = TestNode::new("0", true);
        node.index.append_inbound(&[entry("01", "buffered")]).unwrap();
        let inbound = node.dir.path().join(INBOUND_FILE);

        // The worker's inbound check blocks on this lock.
        let guard = FILE_LOCKS.acquire(&inbound, FileAccess::Write);
        node.distributor.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let (done, submitted) = mpsc::channel();
        let distributor = node.distributor.clone();
        let submitter = std::thread::spawn(move || {
            distributor.submit(DistributionRequest::local(
                Operation::Insert,
                Payload::Entries(vec![entry("1", "foreign")]),
            ));
            let _ = done.send(());
        });

        let result = submitted.recv_timeout(Duration::from_secs(2));
        drop(guard);
        submitter.join().unwrap();
        node.distributor.shutdown();

        assert!(result.is_ok());
    }
}
