// Corpus discovery: every MIDI file under a directory tree.
//
// Files are matched by extension (`.mid` or `.midi`, any case) and returned
// sorted by path, so the concatenated token stream and therefore the whole
// training run are reproducible across machines and filesystems.

use crate::error::PipelineError;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Recursively collect MIDI files under `root`, sorted by path.
pub fn find_midi_files(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::MissingCorpus(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).map_err(PipelineError::io(&dir))? {
            let path = entry.map_err(PipelineError::io(&dir))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_midi_path(&path) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(PipelineError::EmptyCorpus(root.to_path_buf()));
    }
    files.sort();
    debug!("found {} MIDI files under {}", files.len(), root.display());
    Ok(files)
}

fn is_midi_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}
