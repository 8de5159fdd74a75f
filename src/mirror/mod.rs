//! Optional remote spreadsheet mirror.

pub mod client;

pub use client::SheetMirror;
