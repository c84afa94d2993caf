//! Packing a finished job's output blobs into a single download.

use std::io::{Cursor, Write};

use simfarm_core::OutFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build an in-memory zip archive holding every outfile, in order.
///
/// Fails on duplicate names.
pub fn build_zip(files: &[OutFile]) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        writer.start_file(file.name.as_str(), options)?;
        writer.write_all(&file.data)?;
    }

    Ok(writer.finish()?.into_inner())
}
