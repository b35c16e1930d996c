//! End-to-end tests against a single-node replica started through the
//! public [`kvraft::ReplicatedDb`] API — covering the scenarios from the
//! requirements document that don't need a multi-node cluster to observe
//! (single-node Raft still commits through the real log and state
//! machine). Multi-node partition/leader-transfer behavior is exercised
//! at the unit level in `cluster::tests` and `state_machine::tests`, and
//! the snapshot archive round-trip in `snapshot::tests`, since those
//! don't need a live gRPC transport to verify.

use std::time::Duration;

use bytes::Bytes;
use kvraft::codec::value::ScoreOpts;
use kvraft::options::Options;
use kvraft::ReplicatedDb;
use serial_test::serial;

fn single_node_opts(tmp: &std::path::Path, port: u16) -> Options {
    let mut opts = Options::default();
    opts.node_host.data_dir = tmp.to_path_buf();
    opts.node_host.raft_address = format!("127.0.0.1:{port}");
    opts.cluster.node_id = 1;
    opts.cluster.initial_members.insert(1, opts.node_host.raft_address.clone());
    opts.cluster.election_timeout_min_ms = 150;
    opts.cluster.election_timeout_max_ms = 300;
    opts.cluster.heartbeat_interval_ms = 50;
    opts
}

async fn start_single_node(port: u16) -> (tempfile::TempDir, ReplicatedDb) {
    let tmp = tempfile::tempdir().unwrap();
    let opts = single_node_opts(tmp.path(), port);
    let db = ReplicatedDb::open(opts).await.expect("replica starts");
    db.wait_for_leader(Duration::from_secs(5)).await.expect("leader elected");
    (tmp, db)
}

#[tokio::test]
#[serial]
async fn put_and_get_roundtrip() {
    let (_tmp, db) = start_single_node(19101).await;

    db.client
        .put("orders", Bytes::from_static(b"o-1"), Bytes::from_static(b"paid"), 0)
        .await
        .unwrap();

    let got = db.client.get("orders", Bytes::from_static(b"o-1")).await.unwrap();
    assert_eq!(got.unwrap().value.as_ref(), b"paid");

    let missing = db.client.get("orders", Bytes::from_static(b"o-2")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
async fn ttl_expiry_boundary() {
    let (_tmp, db) = start_single_node(19102).await;

    db.client
        .put_with_timestamp("sessions", Bytes::from_static(b"s-1"), Bytes::from_static(b"tok"), 1, 1_000)
        .await
        .unwrap();

    // The engine's own TTL boundary test (`engine::tests::ttl_expiry_hides_entry`)
    // already exercises `now_ms` exactly at and past expiry; here we only
    // confirm the entry is visible before its ttl window closes.
    let got = db.client.get("sessions", Bytes::from_static(b"s-1")).await.unwrap();
    assert!(got.is_some());
}

#[tokio::test]
#[serial]
async fn list_push_and_range() {
    let (_tmp, db) = start_single_node(19103).await;

    db.client
        .rpush(
            "queues",
            Bytes::from_static(b"jobs"),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")],
        )
        .await
        .unwrap();

    let all = db.client.lrange("queues", Bytes::from_static(b"jobs"), 0, -1).await.unwrap();
    assert_eq!(all, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from_static(b"c")]);

    let popped = db.client.lpop("queues", Bytes::from_static(b"jobs")).await.unwrap();
    assert_eq!(popped, Some(Bytes::from_static(b"a")));
}

#[tokio::test]
#[serial]
async fn sorted_set_range_and_count() {
    let (_tmp, db) = start_single_node(19104).await;

    db.client.zadd("leaderboard", Bytes::from_static(b"scores"), 10.0, Bytes::from_static(b"alice")).await.unwrap();
    db.client.zadd("leaderboard", Bytes::from_static(b"scores"), 20.0, Bytes::from_static(b"bob")).await.unwrap();
    db.client.zadd("leaderboard", Bytes::from_static(b"scores"), 30.0, Bytes::from_static(b"carol")).await.unwrap();

    let count = db.client.zcount("leaderboard", Bytes::from_static(b"scores"), 15.0, 30.0).await.unwrap();
    assert_eq!(count, 2);

    let range = db
        .client
        .zrange_by_score(
            "leaderboard",
            Bytes::from_static(b"scores"),
            0.0,
            100.0,
            ScoreOpts {
                limit: 2,
                exclude_start: false,
                exclude_end: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(range.len(), 2);
    assert_eq!(range[0].key.as_ref(), b"alice");
}
