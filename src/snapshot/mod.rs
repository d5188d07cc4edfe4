// SPDX-License-Identifier: GPL-3.0-only
pub mod codec;

pub use codec::{decode, encode, export_file_name, Snapshot, SNAPSHOT_VERSION};
