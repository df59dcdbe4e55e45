use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use crate::error::{MinyamiError, MinyamiResult};

fn media_file_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)^[^/]+?\.(?:ts|m4s|mp4|m4a|m4v|aac|cmfv|cmfa)$")
            .expect("media file regex must be valid")
    })
}

/// A chunk of the stream to download.
///
/// `filename` is also the name of the temporary file the chunk is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub url: String,
    pub filename: String,
}

impl Segment {
    pub fn new(url: String, raw_path: &str) -> MinyamiResult<Self> {
        let filename = segment_filename(raw_path).ok_or_else(|| {
            MinyamiError::MalformedPlaylist(format!("no media file name in segment {raw_path}"))
        })?;
        Ok(Self { url, filename })
    }
}

/// Last path component of `raw_path`, if it looks like a media file.
pub fn segment_filename(raw_path: &str) -> Option<String> {
    let path = raw_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let last = path.rsplit('/').next()?;
    media_file_regex()
        .is_match(last)
        .then(|| last.to_string())
}

/// Renames repeated file names so that every segment owns its own temporary file.
///
/// The first occurrence keeps its name. Later repetitions become `{stem}_{n}.{ext}`
/// with the smallest `n >= 2` that is neither handed out already nor used as a raw
/// name by any segment of the playlist.
pub(crate) struct SegmentFileNamer {
    reserved: HashSet<String>,
    assigned: HashSet<String>,
}

impl SegmentFileNamer {
    /// `raw_names` are the file names of every segment, including the ones not named yet.
    pub(crate) fn new<'a>(raw_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            reserved: raw_names.into_iter().map(str::to_string).collect(),
            assigned: HashSet::new(),
        }
    }

    pub(crate) fn unique(&mut self, filename: String) -> String {
        if self.assigned.insert(filename.clone()) {
            return filename;
        }

        let renamed = (2u32..)
            .map(|n| match filename.rsplit_once('.') {
                Some((stem, ext)) => format!("{stem}_{n}.{ext}"),
                None => format!("{filename}_{n}"),
            })
            .find(|candidate| {
                !self.assigned.contains(candidate) && !self.reserved.contains(candidate)
            })
            .unwrap_or_default();
        self.assigned.insert(renamed.clone());
        log::debug!("Segment file name {filename} is duplicated, renamed to {renamed}");
        renamed
    }
}
