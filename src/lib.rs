#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod accessors;
pub mod crc_engines;
pub mod dispatch;
pub mod error;
pub mod print;
pub mod protocols;
pub mod state;

pub use error::{ParserError, Result};
pub use state::{
    Frame, ParseState, ParseStats, ParserDescription, ParserTable, ProtocolState, StepContext,
    StepOutcome,
};

pub use protocols::{hash, nmea, rtcm, sbf, spartn, ublox, unicore_binary};

#[cfg(any(feature = "async-codec", feature = "tokio-codec"))]
#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// `Decoder` glue over [`ParseState`] for `asynchronous-codec`/`tokio_util::codec`
/// pipelines.
pub mod codec;
