// =============================================================================
// Event Hub — typed broadcast channels replacing the mutable event emitter
// =============================================================================
//
// The original design's event-emitter-on-a-mutable-singleton becomes four
// independent `tokio::sync::broadcast` channels, one per event kind. Any
// number of subscribers (dashboards, loggers, tests) can listen without the
// engine knowing or caring who's on the other end; a lagging subscriber only
// drops its own messages, never blocks the engine.
// =============================================================================

use tokio::sync::broadcast;

use crate::types::{Direction, GradedSignal};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisEvent {
    pub symbol: String,
    pub timeframe: String,
    pub strategy: String,
}

#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub symbol: String,
    pub graded: GradedSignal,
}

#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
}

pub struct EventHub {
    log: broadcast::Sender<LogEvent>,
    analysis: broadcast::Sender<AnalysisEvent>,
    signal: broadcast::Sender<SignalEvent>,
    trade: broadcast::Sender<TradeEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            log: broadcast::channel(CHANNEL_CAPACITY).0,
            analysis: broadcast::channel(CHANNEL_CAPACITY).0,
            signal: broadcast::channel(CHANNEL_CAPACITY).0,
            trade: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEvent> {
        self.log.subscribe()
    }
    pub fn subscribe_analysis(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.analysis.subscribe()
    }
    pub fn subscribe_signal(&self) -> broadcast::Receiver<SignalEvent> {
        self.signal.subscribe()
    }
    pub fn subscribe_trade(&self) -> broadcast::Receiver<TradeEvent> {
        self.trade.subscribe()
    }

    /// Broadcast sends are fire-and-forget: `Err` only means there are
    /// currently no subscribers, which is a normal, non-exceptional state.
    pub fn publish_log(&self, event: LogEvent) {
        let _ = self.log.send(event);
    }
    pub fn publish_analysis(&self, event: AnalysisEvent) {
        let _ = self.analysis.send(event);
    }
    pub fn publish_signal(&self, event: SignalEvent) {
        let _ = self.signal.send(event);
    }
    pub fn publish_trade(&self, event: TradeEvent) {
        let _ = self.trade.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Grade, RawSignal};

    #[tokio::test]
    async fn subscribers_receive_published_trade_events() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe_trade();

        hub.publish_trade(TradeEvent { symbol: "BTCUSDT".to_string(), direction: Direction::Long, entry_price: 100.0, size: 1.0 });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.symbol, "BTCUSDT");
        assert_eq!(received.direction, Direction::Long);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let hub = EventHub::new();
        hub.publish_signal(SignalEvent {
            symbol: "ETHUSDT".to_string(),
            graded: GradedSignal {
                raw: RawSignal::none(),
                grade: Grade::F,
                quality_score: 0.0,
                win_probability: 0.0,
                tradeable: false,
                reject_reason: None,
            },
        });
    }
}
