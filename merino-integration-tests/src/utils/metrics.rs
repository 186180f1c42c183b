//! Tools to help testing metrics

use cadence::{SpyMetricSink, StatsdClient};
use crossbeam_channel::Receiver;
use statsd_parser::{Message, Metric};

/// Helper to collect metrics during tests, and make assertions about them.
pub struct MetricsWatcher {
    /// Crossbeam channel that receives metrics lines as bytes.
    rx: Receiver<Vec<u8>>,

    /// Metrics received by the watcher from [`rx`].
    messages: Vec<Message>,
}

impl MetricsWatcher {
    /// Make a new metrics watcher, attach it to a [`StatsdClient`] and return both.
    ///
    /// The client has no prefix, so metric names can be matched as written in
    /// the code that emits them.
    pub fn new_with_client() -> (Self, StatsdClient) {
        let (rx, spy_sink) = SpyMetricSink::new();
        let metrics_client = StatsdClient::from_sink("", spy_sink);
        let metrics_watcher = Self {
            rx,
            messages: vec![],
        };

        (metrics_watcher, metrics_client)
    }

    /// Consume any waiting events from `rx` and parse them as metrics.
    fn process_events(&mut self) {
        self.messages.extend(self.rx.try_iter().map(|bytes| {
            let s = String::from_utf8(bytes).expect("Invalid UTF8 in metric message");
            statsd_parser::parse(s).expect("Metric message parse error")
        }));
    }

    /// Get a list of all the metrics seen by this watcher, primarily for debugging.
    pub fn all_messages(&mut self) -> &[Message] {
        self.process_events();
        self.messages.as_slice()
    }

    /// Test if any metric this watcher received matches `predicate`.
    pub fn has<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&Message) -> bool,
    {
        self.all_messages().iter().any(predicate)
    }

    /// Sum the counters named `name` whose tag `tag` has the value `value`.
    /// Pass `None` to ignore tags.
    pub fn count(&mut self, name: &str, tag: Option<(&str, &str)>) -> f64 {
        self.all_messages()
            .iter()
            .filter(|msg| msg.name == name && has_tag(msg, tag))
            .map(|msg| match &msg.metric {
                Metric::Counter(counter) => counter.value,
                _ => 0.0,
            })
            .sum()
    }

    /// The value of the most recent gauge named `name` whose tag `tag` has the
    /// value `value`.
    pub fn last_gauge(&mut self, name: &str, tag: Option<(&str, &str)>) -> Option<f64> {
        self.all_messages()
            .iter()
            .rev()
            .filter(|msg| msg.name == name && has_tag(msg, tag))
            .find_map(|msg| match &msg.metric {
                Metric::Gauge(gauge) => Some(gauge.value),
                _ => None,
            })
    }
}

/// Whether `msg` carries the tag, or `tag` is `None`.
fn has_tag(msg: &Message, tag: Option<(&str, &str)>) -> bool {
    match tag {
        None => true,
        Some((key, value)) => msg
            .tags
            .as_ref()
            .and_then(|tags| tags.get(key))
            .map_or(false, |found| found == value),
    }
}
