#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(unused)]

//! Exporter sampling aggregates of an [EQEmu](https://github.com/EQEmu/Server)
//! game database and republishing them as time series.
//!
//! Independent poll loops, one per [`Collector`](collectors::Collector),
//! query the database on a fixed interval, reduce the rows to
//! [`Observation`](observation::Observation)s and hand them to a
//! [`Sink`](sink::Sink). The [`PullSink`](sink::PullSink) records them in a
//! [`Registry`](registry::Registry) served in the [Open Metrics text
//! format](https://github.com/OpenObservability/OpenMetrics) for
//! [Prometheus](https://prometheus.io/) to scrape. The
//! [`PushSink`](sink::PushSink) posts them as line protocol to an InfluxDB
//! compatible endpoint.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! use eqemu_exporter::catalog::{self, Catalog};
//! use eqemu_exporter::observation::Observation;
//! use eqemu_exporter::sink::{register_catalog, PullSink, Sink};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! // Build the catalog of families from the item categories.
//! let catalog = Arc::new(Catalog::new(catalog::default_categories()).unwrap());
//!
//! // Make every family known to the sink before it is shared.
//! let mut sink = PullSink::with_prefix("eqemu");
//! register_catalog(&mut sink, &catalog).unwrap();
//!
//! // A poll loop publishes one observation per family and iteration.
//! let observation = Observation::new(
//!     catalog::CATEGORY,
//!     vec!["dragon".to_owned()],
//!     12,
//!     SystemTime::now(),
//! );
//! sink.publish(&observation).await.unwrap();
//!
//! // Encode all families into the Open Metrics text format.
//! let encoded = sink.encode().unwrap();
//! assert!(encoded.contains("eqemu_card_count{category=\"dragon\"} 12.0\n"));
//! assert!(encoded.ends_with("# EOF\n"));
//! # });
//! ```
//!
//! Series carry no `service` label; see [`catalog`] for how the names
//! relate to earlier exporters.
//!
//! See the `eqemu-exporter` binary for how the pieces are wired together.

pub mod catalog;
pub mod collectors;
pub mod config;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observation;
pub mod poller;
pub mod reduce;
pub mod registry;
pub mod server;
pub mod sink;
pub mod source;
pub mod supervisor;
