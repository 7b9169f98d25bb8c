use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, Bytes, U256, address};
use escrow_events::{
    dispatch::{DispatchOutputs, Dispatcher, DispatcherState},
    error::{DispatchError, LogSourceError, StreamError},
    testing::{self, ChannelLogSource},
    types::{Category, EscrowId, LogBatch, LogRecord, TradeEvent, TradeStage},
};
use tokio::{sync::mpsc, time::timeout};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    feed: mpsc::Sender<LogBatch>,
    dispatcher: Dispatcher<ChannelLogSource>,
    outputs: DispatchOutputs,
    cancel: CancellationToken,
}

async fn start() -> Harness {
    let (feed, source) = ChannelLogSource::channel();
    start_with(feed, source).await
}

async fn start_with(feed: mpsc::Sender<LogBatch>, source: ChannelLogSource) -> Harness {
    let mut dispatcher = Dispatcher::new(Arc::new(testing::registry()), source, 0);
    let cancel = CancellationToken::new();
    let outputs = assert_ok!(dispatcher.start(cancel.clone()).await);
    Harness {
        feed,
        dispatcher,
        outputs,
        cancel,
    }
}

impl Harness {
    async fn send(&self, logs: Vec<LogRecord>) {
        self.feed.send(LogBatch::new(logs)).await.unwrap();
    }

    async fn trade(&mut self) -> TradeEvent {
        timeout(TIMEOUT, self.outputs.trades.recv())
            .await
            .unwrap()
            .unwrap()
            .into_event()
    }

    /// Closes the feed and waits for the dispatcher to drain and stop.
    async fn finish(mut self) -> (Vec<TradeEvent>, Vec<StreamError>) {
        drop(self.feed);
        let (mut trades, mut errors) = (Vec::new(), Vec::new());
        let (mut trades_open, mut errors_open) = (true, true);
        while trades_open || errors_open {
            tokio::select! {
                trade = self.outputs.trades.recv(), if trades_open => match trade {
                    Some(trade) => trades.push(trade.into_event()),
                    None => trades_open = false,
                },
                err = self.outputs.errors.recv(), if errors_open => match err {
                    Some(err) => errors.push(err),
                    None => errors_open = false,
                },
            }
        }
        assert_ok!(timeout(TIMEOUT, self.outputs.handle).await.unwrap());
        assert_eq!(self.dispatcher.state(), DispatcherState::Stopped);
        (trades, errors)
    }
}

#[tokio::test]
async fn test_every_category_classifies_to_itself() {
    let mut h = start().await;
    h.send(
        Category::ALL
            .into_iter()
            .map(|category| testing::created_log(category, 1, 2, 3))
            .collect(),
    )
    .await;

    for category in Category::ALL {
        let trade = h.trade().await;
        assert_eq!(trade.category, category);
        assert_eq!(trade.stage, TradeStage::Create);
    }
}

#[tokio::test]
async fn test_create_of_fungible_pair() {
    let mut h = start().await;
    h.send(vec![testing::created_log(Category::FF, 7, 100, 50)])
        .await;

    let trade = h.trade().await;
    assert_eq!(
        trade,
        TradeEvent {
            stage: TradeStage::Create,
            escrow_id: EscrowId::from(7),
            category: Category::FF,
            x_asset: testing::X_ASSET,
            y_asset: testing::Y_ASSET,
            x_amount: U256::from(100),
            y_amount: U256::from(50),
            x_address: testing::X_OWNER,
            y_address: testing::Y_OWNER,
        }
    );
    assert_eq!(trade.x_amount.to_string(), "100");
    assert_eq!(trade.y_amount.to_string(), "50");
}

#[tokio::test]
async fn test_amount_semantics_follow_category() {
    let mut h = start().await;
    h.send(vec![
        testing::created_log(Category::FN, 1, 1000, 42),
        testing::created_log(Category::NF, 2, 42, 1000),
    ])
    .await;

    // FN: quantity offered for token #42
    let fungible_nft = h.trade().await;
    assert_eq!(fungible_nft.x_amount, U256::from(1000));
    assert_eq!(fungible_nft.y_amount, U256::from(42));

    // NF: token #42 offered for a quantity
    let nft_fungible = h.trade().await;
    assert_eq!(nft_fungible.x_amount, U256::from(42));
    assert_eq!(nft_fungible.y_amount, U256::from(1000));
}

#[tokio::test]
async fn test_lifecycle_of_single_escrow() {
    let h = start().await;
    h.send(vec![
        testing::created_log(Category::NN, 3, 11, 12),
        testing::accepted_log(Category::NN, 3),
        testing::rejected_log(Category::NN, 4),
    ])
    .await;

    let (trades, errors) = h.finish().await;
    assert!(errors.is_empty());
    assert_eq!(
        trades.iter().map(|t| t.stage).collect::<Vec<_>>(),
        vec![TradeStage::Create, TradeStage::Accept, TradeStage::Reject]
    );

    let accepted = &trades[1];
    assert_eq!(accepted.escrow_id, EscrowId::from(3));
    assert_eq!(accepted.category, Category::NN);
    assert_eq!(accepted.y_address, testing::Y_OWNER);
    assert_eq!(accepted.x_amount.to_string(), "0");
    assert_eq!(accepted.y_amount.to_string(), "0");
    assert_eq!(accepted.x_address, Address::ZERO);

    assert_eq!(trades[2].escrow_id, EscrowId::from(4));
}

#[tokio::test]
async fn test_unknown_logs_are_skipped_silently() {
    let h = start().await;
    let created = testing::created_log(Category::FF, 1, 1, 1);
    let unknown_topic = LogRecord::new(
        created.address(),
        vec![B256::repeat_byte(0x11)],
        created.data().clone(),
    );
    let unknown_contract = LogRecord::new(
        address!("0x00000000000000000000000000000000000000ee"),
        created.topics().to_vec(),
        created.data().clone(),
    );
    h.send(vec![
        unknown_topic,
        unknown_contract,
        testing::paused_log(Category::FN),
    ])
    .await;

    let (trades, errors) = h.finish().await;
    assert!(trades.is_empty());
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_undecodable_log_does_not_block_batch() {
    let mut h = start().await;
    let created = testing::created_log(Category::FN, 1, 1, 1);
    let broken = LogRecord::new(
        created.address(),
        created.topics().to_vec(),
        Bytes::copy_from_slice(&created.data()[..40]),
    );
    h.send(vec![broken, testing::created_log(Category::FN, 2, 5, 6)])
        .await;

    assert_eq!(h.trade().await.escrow_id, EscrowId::from(2));

    let (trades, errors) = h.finish().await;
    assert!(trades.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        StreamError::Decode(e) if e.event == "EscrowCreated"
            && e.category == Category::FN
            && e.context.address == testing::FN
    ));
}

#[tokio::test]
async fn test_trades_keep_log_order() {
    let h = start().await;
    h.send(vec![
        testing::created_log(Category::FF, 1, 10, 10),
        testing::created_log(Category::FF, 2, 10, 10),
    ])
    .await;
    h.send(vec![testing::created_log(Category::NN, 3, 10, 10)])
        .await;

    let (trades, _) = h.finish().await;
    assert_eq!(
        trades.iter().map(|t| t.escrow_id).collect::<Vec<_>>(),
        vec![EscrowId::from(1), EscrowId::from(2), EscrowId::from(3)]
    );
}

#[tokio::test]
async fn test_removed_logs_are_not_dispatched() {
    let h = start().await;
    h.feed
        .send(LogBatch {
            added: vec![testing::created_log(Category::FF, 1, 1, 1)],
            removed: vec![testing::created_log(Category::FF, 9, 1, 1)],
        })
        .await
        .unwrap();

    let (trades, _) = h.finish().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].escrow_id, EscrowId::from(1));
}

#[tokio::test]
async fn test_cancel_with_undrained_outputs() {
    let mut h = start().await;
    h.send(
        (1..=5)
            .map(|id| testing::created_log(Category::FF, id, 1, 1))
            .collect(),
    )
    .await;

    // One trade is taken, the next one fills the channel and the rest stall
    assert_eq!(h.trade().await.escrow_id, EscrowId::from(1));
    h.cancel.cancel();

    let mut state = h.dispatcher.watch_state();
    assert_ok!(
        timeout(TIMEOUT, state.wait_for(|s| *s == DispatcherState::Stopped))
            .await
            .unwrap()
    );
    assert_ok!(timeout(TIMEOUT, h.outputs.handle).await.unwrap());
}

#[tokio::test]
async fn test_connect_failure_keeps_dispatcher_idle() {
    let (_feed, source) = ChannelLogSource::channel();
    let mut dispatcher =
        Dispatcher::new(Arc::new(testing::registry()), source.refuse_connect(), 0);

    let err = assert_err!(dispatcher.start(CancellationToken::new()).await);
    assert!(matches!(err, DispatchError::Connect(LogSourceError::Connect(_))));
    assert_eq!(dispatcher.state(), DispatcherState::Idle);
}

#[tokio::test]
async fn test_start_only_once() {
    let mut h = start().await;
    assert_eq!(h.dispatcher.state(), DispatcherState::Running);

    let err = assert_err!(h.dispatcher.start(CancellationToken::new()).await);
    assert!(matches!(
        err,
        DispatchError::AlreadyStarted(DispatcherState::Running)
    ));

    let (_, errors) = h.finish().await;
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_subscription_filter() {
    let (feed, source) = ChannelLogSource::channel();
    let (filter_tx, mut filter_rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(
        Arc::new(testing::registry()),
        source.report_filter(filter_tx),
        1234,
    );
    let outputs = assert_ok!(dispatcher.start(CancellationToken::new()).await);

    let filter = timeout(TIMEOUT, filter_rx.recv()).await.unwrap().unwrap();
    assert_eq!(filter.from_block(), 1234);
    assert_eq!(filter.addresses(), &testing::ADDRESSES);

    drop(feed);
    assert_ok!(timeout(TIMEOUT, outputs.handle).await.unwrap());
}

#[tokio::test]
async fn test_source_failure_is_reported() {
    let (feed, source) = ChannelLogSource::channel();
    let mut dispatcher = Dispatcher::new(
        Arc::new(testing::registry()),
        source.fail_on_close("node went away"),
        0,
    );
    let DispatchOutputs {
        mut trades,
        mut errors,
        handle,
    } = assert_ok!(dispatcher.start(CancellationToken::new()).await);

    feed.send(LogBatch::new(vec![testing::created_log(Category::NF, 1, 1, 1)]))
        .await
        .unwrap();
    let trade = timeout(TIMEOUT, trades.recv()).await.unwrap().unwrap();
    assert_eq!(trade.event().category, Category::NF);

    drop(feed);
    let err = timeout(TIMEOUT, errors.recv()).await.unwrap();
    assert!(matches!(
        err,
        Some(StreamError::Source(LogSourceError::Transport(ref msg))) if msg == "node went away"
    ));
    assert!(timeout(TIMEOUT, errors.recv()).await.unwrap().is_none());
    assert_ok!(timeout(TIMEOUT, handle).await.unwrap());
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn test_dropped_error_receiver_does_not_stop_trades() {
    let (feed, source) = ChannelLogSource::channel();
    let mut dispatcher = Dispatcher::new(Arc::new(testing::registry()), source, 0);
    let DispatchOutputs {
        mut trades,
        errors,
        handle,
    } = assert_ok!(dispatcher.start(CancellationToken::new()).await);
    drop(errors);

    let accepted = testing::accepted_log(Category::FF, 1);
    let broken = LogRecord::new(testing::FF, accepted.topics().to_vec(), Bytes::new());
    feed.send(LogBatch::new(vec![
        broken.clone(),
        testing::created_log(Category::FF, 2, 1, 1),
        broken,
        testing::created_log(Category::FF, 3, 1, 1),
    ]))
    .await
    .unwrap();

    for id in [2, 3] {
        let trade = timeout(TIMEOUT, trades.recv()).await.unwrap().unwrap();
        assert_eq!(trade.event().escrow_id, EscrowId::from(id));
    }

    drop(feed);
    assert!(timeout(TIMEOUT, trades.recv()).await.unwrap().is_none());
    assert_ok!(timeout(TIMEOUT, handle).await.unwrap());
}

#[tokio::test]
async fn test_dropped_trade_receiver_stops_dispatcher() {
    let (feed, source) = ChannelLogSource::channel();
    let mut dispatcher = Dispatcher::new(Arc::new(testing::registry()), source, 0);
    let outputs = assert_ok!(dispatcher.start(CancellationToken::new()).await);
    drop(outputs.trades);

    feed.send(LogBatch::new(vec![testing::created_log(Category::NN, 1, 1, 1)]))
        .await
        .unwrap();
    assert_ok!(timeout(TIMEOUT, outputs.handle).await.unwrap());
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}
