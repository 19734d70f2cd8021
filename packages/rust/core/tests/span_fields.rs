//! Span fields on the split and load stages carry their arguments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

use tepdiag_core::{load_data, split_by_run, with_run_id};
use tepdiag_shared::{Layout, PipelineConfig};
use tepdiag_storage::{MemoryStore, StoreExt};

type Recorded = Arc<Mutex<BTreeMap<String, BTreeMap<String, String>>>>;

/// Records the fields set when each span is created, keyed by span name.
#[derive(Clone, Default)]
struct SpanFields(Recorded);

struct Values<'a>(&'a mut BTreeMap<String, String>);

impl Visit for Values<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for SpanFields {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let mut values = BTreeMap::new();
        attrs.record(&mut Values(&mut values));
        self.0
            .lock()
            .unwrap()
            .insert(attrs.metadata().name().to_string(), values);
    }
}

impl SpanFields {
    fn of(&self, span: &str) -> BTreeMap<String, String> {
        self.0.lock().unwrap().get(span).cloned().unwrap_or_default()
    }
}

fn master() -> DataFrame {
    let faults: Vec<i32> = (0..10).map(|i| i / 5).collect();
    let runs: Vec<i32> = (0..10).map(|i| i % 5 + 1).collect();
    let samples = vec![1i32; 10];
    let values: Vec<f32> = (0..10).map(|i| i as f32).collect();
    DataFrame::new(vec![
        Series::new("faultNumber".into(), faults).into(),
        Series::new("simulationRun".into(), runs).into(),
        Series::new("sample".into(), samples).into(),
        Series::new("xmeas_1".into(), values).into(),
    ])
    .unwrap()
}

#[test]
fn split_span_records_test_size_and_seed() {
    let fields = SpanFields::default();
    let subscriber = Registry::default().with(fields.clone());
    let df = with_run_id(master()).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        split_by_run(&df, 0.2, 42).unwrap();
    });

    let split = fields.of("split_by_run");
    assert_eq!(split.get("rows").map(String::as_str), Some("10"));
    assert_eq!(split.get("test_size").map(String::as_str), Some("0.2"));
    assert_eq!(split.get("seed").map(String::as_str), Some("42"));
}

#[test]
fn load_span_records_n_simulations() {
    let fields = SpanFields::default();
    let subscriber = Registry::default().with(fields.clone());
    let store = MemoryStore::new();
    let layout = Layout::from(&PipelineConfig::default());
    store.save_frame(&layout.master(), &mut master()).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        load_data(&store, &layout, 3).unwrap();
    });

    let load = fields.of("load_data");
    assert_eq!(load.get("n_simulations").map(String::as_str), Some("3"));
}
