//! Integration test: read convergence against an in-memory chain.
//!
//! Exercises the engine's read paths end to end:
//! 1. Values round-trip through the aggregator unchanged
//! 2. A latest-price request is resolved once and fulfilled ahead of the call,
//!    declaring only the feeds the service answered for
//! 3. A benchmark request is resolved at exactly the reported publish time
//! 4. Wrapped request lists are fulfilled in reverse declared order
//! 5. Requests raised in later rounds are prepended ahead of earlier ones
//! 6. Batched reads return one value per argument list, in order
//! 7. Reverts outside the protocol, empty ones included, fail after a single simulation
//! 8. Endless requests stop at the attempt guard
//! 9. Price service outages surface once the retry budget is spent
//!
//! This test uses pullfeed-engine, pullfeed-price and pullfeed-revert over
//! the fakes in pullfeed-integration-tests. No network I/O.

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Function;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{Revert, SolError};
use pullfeed_abi::parse_function;
use pullfeed_engine::{Engine, EngineConfig, EngineError};
use pullfeed_integration_tests::{
    feed, retrying_config, single_try_config, uint, unix_now, FakeNode, FakePriceService, Script,
};
use pullfeed_price::{OracleResolver, ResolverConfig};
use pullfeed_revert::{encode_errors, encode_oracle_data_required};
use pullfeed_types::{OracleRequest, UpdateType};

const TARGET: Address = Address::repeat_byte(0x7a);
const ADAPTER_A: Address = Address::repeat_byte(0xaa);
const ADAPTER_B: Address = Address::repeat_byte(0xbb);

fn engine(node: &Arc<FakeNode>, prices: &Arc<FakePriceService>, config: EngineConfig) -> Engine {
    let resolver = OracleResolver::new(prices.clone(), ResolverConfig::default());
    Engine::new(node.clone(), resolver, config)
}

fn get_price() -> Function {
    parse_function("function getPrice(uint256 market) returns (uint256)").expect("signature")
}

fn latest(adapter: Address, byte: u8) -> OracleRequest {
    OracleRequest::latest(adapter, vec![feed(byte)], 60)
}

#[tokio::test]
async fn test_values_round_trip_through_aggregator() {
    let node = Arc::new(FakeNode::succeeding());
    let prices = Arc::new(FakePriceService::new());
    let function = parse_function(
        "function mirror(uint256 a, bool b, bytes c) returns (uint256, bool, bytes)",
    )
    .expect("signature");
    let args = vec![
        uint(123_456_789),
        DynSolValue::Bool(true),
        DynSolValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
    ];

    let value = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &function, &args)
        .await
        .expect("call");

    assert_eq!(value, DynSolValue::Tuple(args));
    assert_eq!(node.simulation_count().await, 1);
    assert!(prices.latest_calls().await.is_empty());
}

#[tokio::test]
async fn test_latest_request_resolved_once() {
    let need = latest(ADAPTER_A, 0xe7);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&need),
    ])));
    let prices = Arc::new(FakePriceService::new());

    let value = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(7)])
        .await
        .expect("converge");
    assert_eq!(value, uint(7));

    assert_eq!(prices.latest_calls().await, vec![vec![feed(0xe7)]]);
    assert!(prices.benchmark_calls().await.is_empty());

    let simulations = node.simulations().await;
    assert_eq!(simulations.len(), 2);
    let last = &simulations[1];
    assert_eq!(last.calls.len(), 2);
    assert_eq!(last.calls[0].target, ADAPTER_A);
    assert_eq!(last.calls[0].value, U256::from(1));
    assert_eq!(last.calls[1].target, TARGET);
    assert_eq!(last.value, U256::from(1));

    let fulfillments = last.fulfillments();
    assert_eq!(fulfillments.len(), 1);
    let (_, fulfillment) = &fulfillments[0];
    assert_eq!(fulfillment.update_type, UpdateType::Latest.as_u8());
    assert_eq!(fulfillment.staleness_or_publish_time, 60);
    assert_eq!(fulfillment.feed_ids, vec![feed(0xe7)]);
}

#[tokio::test]
async fn test_benchmark_request_uses_reported_time() {
    let publish_time = unix_now() - 30;
    let need = OracleRequest::benchmark(ADAPTER_A, feed(0xb7), publish_time);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&need),
    ])));
    let prices = Arc::new(FakePriceService::new());

    engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect("converge");

    assert_eq!(prices.benchmark_calls().await, vec![(feed(0xb7), publish_time)]);
    assert!(prices.latest_calls().await.is_empty());

    let last = node.last_simulation().await.expect("simulated");
    let fulfillments = last.fulfillments();
    assert_eq!(fulfillments.len(), 1);
    assert_eq!(fulfillments[0].1.update_type, UpdateType::Benchmark.as_u8());
    assert_eq!(fulfillments[0].1.staleness_or_publish_time, publish_time);
}

#[tokio::test]
async fn test_wrapped_requests_prepended_in_reverse_order() {
    let first = latest(ADAPTER_A, 0xe7);
    let second = OracleRequest::benchmark(ADAPTER_B, feed(0xb7), unix_now() - 120);
    let wrapped = encode_errors(&[
        encode_oracle_data_required(&first),
        encode_oracle_data_required(&second),
    ]);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![wrapped])));
    let prices = Arc::new(FakePriceService::new());

    engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect("converge");

    let simulations = node.simulations().await;
    assert_eq!(simulations.len(), 2);
    let targets: Vec<Address> = simulations[1].calls.iter().map(|c| c.target).collect();
    assert_eq!(targets, vec![ADAPTER_B, ADAPTER_A, TARGET]);
    assert_eq!(simulations[1].value, U256::from(2));
    assert_eq!(prices.latest_calls().await.len(), 1);
    assert_eq!(prices.benchmark_calls().await.len(), 1);
}

#[tokio::test]
async fn test_later_rounds_prepend_ahead_of_earlier_fulfillments() {
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&latest(ADAPTER_A, 0xe7)),
        encode_oracle_data_required(&latest(ADAPTER_B, 0xb7)),
    ])));
    let prices = Arc::new(FakePriceService::new());

    engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect("converge");

    let simulations = node.simulations().await;
    assert_eq!(simulations.len(), 3);
    let targets: Vec<Address> = simulations[2].calls.iter().map(|c| c.target).collect();
    assert_eq!(targets, vec![ADAPTER_B, ADAPTER_A, TARGET]);
}

#[tokio::test]
async fn test_same_adapter_latest_requests_share_one_lookup() {
    let wrapped = encode_errors(&[
        encode_oracle_data_required(&OracleRequest::latest(ADAPTER_A, vec![feed(0x11)], 60)),
        encode_oracle_data_required(&OracleRequest::latest(ADAPTER_A, vec![feed(0x22)], 30)),
    ]);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![wrapped])));
    let prices = Arc::new(FakePriceService::new());

    engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect("converge");

    assert_eq!(prices.latest_calls().await.len(), 1);
    let last = node.last_simulation().await.expect("simulated");
    let fulfillments = last.fulfillments();
    assert_eq!(fulfillments.len(), 1);
    let (adapter, fulfillment) = &fulfillments[0];
    assert_eq!(*adapter, ADAPTER_A);
    assert_eq!(fulfillment.staleness_or_publish_time, 30);
    assert_eq!(fulfillment.feed_ids.len(), 2);
    assert!(fulfillment.feed_ids.contains(&feed(0x11)));
    assert!(fulfillment.feed_ids.contains(&feed(0x22)));
}

#[tokio::test]
async fn test_unknown_feeds_dropped_from_lookup() {
    let need = OracleRequest::latest(ADAPTER_A, vec![feed(0x11), feed(0x22)], 60);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&need),
    ])));
    let prices = Arc::new(FakePriceService::new().with_unknown(vec![feed(0x22)]));

    engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect("converge");

    assert_eq!(
        prices.latest_calls().await,
        vec![vec![feed(0x11), feed(0x22)], vec![feed(0x11)]]
    );

    let last = node.last_simulation().await.expect("simulated");
    let fulfillments = last.fulfillments();
    assert_eq!(fulfillments.len(), 1);
    let (adapter, fulfillment) = &fulfillments[0];
    assert_eq!(*adapter, ADAPTER_A);
    assert_eq!(fulfillment.feed_ids, vec![feed(0x11)]);
    assert_eq!(fulfillment.payloads.len(), 1);
    assert_eq!(last.calls[0].value, U256::from(1));
}

#[tokio::test]
async fn test_call_many_returns_values_in_order() {
    let node = Arc::new(FakeNode::succeeding());
    let prices = Arc::new(FakePriceService::new());
    let args_list: Vec<Vec<DynSolValue>> = (1..=5).map(|n| vec![uint(n * 10)]).collect();

    let values = engine(&node, &prices, single_try_config())
        .call_many(TARGET, &get_price(), &args_list)
        .await
        .expect("call many");

    assert_eq!(values, (1..=5).map(|n| uint(n * 10)).collect::<Vec<_>>());
    let simulations = node.simulations().await;
    assert_eq!(simulations.len(), 1);
    assert_eq!(simulations[0].calls.len(), 5);
    assert!(simulations[0].fulfillments().is_empty());
    assert!(prices.latest_calls().await.is_empty());
}

#[tokio::test]
async fn test_call_many_with_oracle_data() {
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&latest(ADAPTER_A, 0xe7)),
    ])));
    let prices = Arc::new(FakePriceService::new());
    let args_list = vec![vec![uint(3)], vec![uint(2)], vec![uint(1)]];

    let values = engine(&node, &prices, single_try_config())
        .call_many(TARGET, &get_price(), &args_list)
        .await
        .expect("call many");

    assert_eq!(values, vec![uint(3), uint(2), uint(1)]);
    let last = node.last_simulation().await.expect("simulated");
    assert_eq!(last.calls.len(), 4);
    assert_eq!(last.calls[0].target, ADAPTER_A);
}

#[tokio::test]
async fn test_call_many_empty_list() {
    let node = Arc::new(FakeNode::succeeding());
    let prices = Arc::new(FakePriceService::new());
    let values = engine(&node, &prices, single_try_config())
        .call_many(TARGET, &get_price(), &[])
        .await
        .expect("empty");
    assert!(values.is_empty());
    assert_eq!(node.simulation_count().await, 0);
}

#[tokio::test]
async fn test_unclassified_revert_fails_after_one_simulation() {
    let revert = Bytes::from(
        Revert {
            reason: "Unauthorized".to_string(),
        }
        .abi_encode(),
    );
    let node = Arc::new(FakeNode::new(Script::Always(revert.clone())));
    let prices = Arc::new(FakePriceService::new());

    let err = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect_err("must fail");

    match err {
        EngineError::Unclassified { data, reason } => {
            assert_eq!(data, revert);
            assert!(reason.expect("reason").contains("Unauthorized"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(node.simulation_count().await, 1);
    assert!(prices.latest_calls().await.is_empty());
}

#[tokio::test]
async fn test_revert_without_data_is_unclassified() {
    let node = Arc::new(FakeNode::new(Script::Always(Bytes::new())));
    let prices = Arc::new(FakePriceService::new());

    let err = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect_err("must fail");

    assert!(matches!(
        err,
        EngineError::Unclassified { ref data, reason: None } if data.is_empty()
    ));
    assert_eq!(node.simulation_count().await, 1);
}

#[tokio::test]
async fn test_unknown_child_in_wrapped_list_is_fatal() {
    let wrapped = encode_errors(&[
        encode_oracle_data_required(&latest(ADAPTER_A, 0xe7)),
        Bytes::from(vec![0x12, 0x34, 0x56, 0x78]),
    ]);
    let node = Arc::new(FakeNode::new(Script::Staged(vec![wrapped.clone()])));
    let prices = Arc::new(FakePriceService::new());

    let err = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect_err("must fail");

    assert!(matches!(err, EngineError::Unclassified { ref data, .. } if *data == wrapped));
    assert_eq!(node.simulation_count().await, 1);
    assert!(prices.latest_calls().await.is_empty());
}

#[tokio::test]
async fn test_endless_requests_stop_at_guard() {
    let node = Arc::new(FakeNode::new(Script::Always(encode_oracle_data_required(
        &latest(ADAPTER_A, 0xe7),
    ))));
    let prices = Arc::new(FakePriceService::new());

    let err = engine(&node, &prices, single_try_config())
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect_err("must stop");

    assert!(matches!(err, EngineError::ConvergenceExceeded { attempts: 5 }));
    assert_eq!(node.simulation_count().await, 5);
}

#[tokio::test]
async fn test_price_outage_surfaces_after_retries() {
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&latest(ADAPTER_A, 0xe7)),
    ])));
    let prices = Arc::new(FakePriceService::new().with_failures(usize::MAX));

    let err = engine(&node, &prices, retrying_config(2))
        .call_once(TARGET, &get_price(), &[uint(1)])
        .await
        .expect_err("must fail");

    assert!(matches!(err, EngineError::OracleServiceUnavailable(_)));
    assert_eq!(prices.latest_calls().await.len(), 2);
    assert_eq!(node.simulation_count().await, 1);
}

#[tokio::test]
async fn test_transient_outage_recovers_within_budget() {
    let node = Arc::new(FakeNode::new(Script::Staged(vec![
        encode_oracle_data_required(&latest(ADAPTER_A, 0xe7)),
    ])));
    let prices = Arc::new(FakePriceService::new().with_failures(1));

    let value = engine(&node, &prices, retrying_config(3))
        .call_once(TARGET, &get_price(), &[uint(9)])
        .await
        .expect("converge after retry");

    assert_eq!(value, uint(9));
    assert_eq!(prices.latest_calls().await.len(), 2);
}
