//! # rawml
//!
//! A read-only decoder for Mobipocket/KF7/KF8 e-book containers (the
//! PalmDB-framed binary format used by Kindle devices). It reconstructs a
//! structured document tree from raw file bytes: decompressed text flow,
//! HTML markup parts stitched from skeleton/fragment indices, embedded
//! resources (images, fonts, audio, video, PDF), and navigation indices.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rawml::Document;
//!
//! let bytes = std::fs::read("book.azw3")?;
//! let doc = Document::load(&bytes)?;
//! println!("{}", doc.full_name().unwrap_or_default());
//!
//! let rawml = doc.parse_rawml()?;
//! for part in &rawml.markup {
//!     println!("{} ({} bytes)", part.file_name(rawml::PartRole::Markup), part.size());
//! }
//! # Ok::<(), rawml::Error>(())
//! ```
//!
//! Hybrid KF7/KF8 files load with the KF8 half active; pass
//! [`LoadOptions`] with `prefer_kf7` or call [`Document::swap_halves`]
//! to work with the legacy half instead.
//!
//! The decoder is synchronous and allocation-owned: a [`Document`] owns
//! its records, a [`Rawml`] owns every reconstructed part. Encrypted
//! documents need a [`TextDecryptor`] hook; the crate ships no cipher.

pub mod buffer;
pub mod document;
pub mod encoding;
pub mod error;
pub mod exth;
pub mod fragment;
pub mod headers;
pub mod huffcdic;
pub mod index;
pub mod links;
pub mod locale;
pub mod palmdoc;
pub mod pdb;
pub mod rawml;
pub mod resources;
pub mod structure;

pub use document::{Document, LoadOptions, TextDecryptor};
pub use error::{Error, Result};
pub use exth::{ExthRecord, ExthType};
pub use headers::{MobiHeader, Record0Header};
pub use index::{Index, IndexEntry};
pub use pdb::{PdbHeader, PdbRecord};
pub use rawml::{Part, PartRole, Rawml};
pub use resources::FileType;
