// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Read control metadata out of `.deb` package files.

A `.deb` file is an `ar(5)` archive whose members include `debian-binary`,
a `control.tar.{gz,xz}` holding package metadata, and a `data.tar.*`
holding the installed payload. Only the control tarball is of interest
here: it contains a `./control` member with the package's paragraph.
*/

use {
    crate::{
        control::{ControlParagraph, ControlParagraphReader},
        error::{DebcacheError, Result},
        io::{decompress, Compression},
    },
    std::io::Read,
};

/// Extract the control paragraph from `.deb` file content.
///
/// Returns `Ok(None)` when the archive is well formed but carries no
/// control file. Malformed archives produce errors. Members other than
/// the control tarball are skipped.
pub async fn control_paragraph(data: &[u8]) -> Result<Option<ControlParagraph<'static>>> {
    let mut archive = ar::Archive::new(std::io::Cursor::new(data));

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(|e| {
            DebcacheError::DebParseError(format!("reading ar member: {}", e))
        })?;

        let compression = match entry.header().identifier() {
            b"control.tar.gz" => Compression::Gzip,
            b"control.tar.xz" => Compression::Xz,
            _ => continue,
        };

        let mut compressed = Vec::with_capacity(entry.header().size() as usize);
        entry.read_to_end(&mut compressed)?;

        let control_tar = decompress(compression, &compressed).await?;

        if let Some(paragraph) = control_from_tar(&control_tar)? {
            return Ok(Some(paragraph));
        }
    }

    Ok(None)
}

/// Locate and parse `./control` within an uncompressed control tarball.
fn control_from_tar(data: &[u8]) -> Result<Option<ControlParagraph<'static>>> {
    let mut archive = tar::Archive::new(std::io::Cursor::new(data));

    for entry in archive.entries().map_err(|e| {
        DebcacheError::DebParseError(format!("reading control tar: {}", e))
    })? {
        let mut entry = entry.map_err(|e| {
            DebcacheError::DebParseError(format!("reading control tar member: {}", e))
        })?;

        let path = entry.path()?.to_string_lossy().into_owned();
        if path != "./control" && path != "control" {
            continue;
        }

        let mut content = vec![];
        entry.read_to_end(&mut content)?;

        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(content))
            .collect::<Result<Vec<_>>>()?;

        if paragraphs.len() == 1 {
            return Ok(Some(paragraphs.into_iter().next().expect("length checked")));
        }
    }

    Ok(None)
}
