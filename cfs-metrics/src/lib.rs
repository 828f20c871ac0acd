//! Fixed-capacity ring-buffered time-series metrics with a compiled,
//! offline PNG chart renderer (C11).

mod expr;
mod persist;
mod png;
mod ring;
mod store;

pub use expr::{eval as eval_rpn, Op};
pub use persist::{import_legacy, load, save, FILE_VERSION};
pub use png::{fix_max, make_chart_png, render_chart, render_png, ExtendedStatOrDirect, HEIGHT, PNG_1X1, WIDTH};
pub use ring::{AggregationMode, RingClock, RingSet, Scale, LENG, NODATA, RANGES};
pub use store::{ExtendedStatDef, MetricsError, MetricsStore, ScaleBias, Source, StatDef};
