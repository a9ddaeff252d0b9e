//! Note store library behind the `notes` CLI.
//!
//! Daily notes are plain text files keyed by calendar date and laid out as
//! `<root>/<YYYY>/<MM>/<YYYY-MM-DD>.<ext>`. A new daily note is seeded from the
//! closest earlier one: its carryover sections are copied forward with done
//! items dropped. General notes are free-form files under `<root>/general/`
//! tagged through a single `tags:` line.
//!
//! The core (dates, paths, scanning, section extraction, templating) is pure
//! over the `storage::NoteStore` seam; the outer modules wrap editors, the
//! calendar view, summaries and archives.

pub mod error {
    use std::{io, path::PathBuf};
    use thiserror::Error;

    pub type NoteResult<T> = Result<T, NoteError>;

    #[derive(Debug, Error)]
    pub enum NoteError {
        /// Malformed user input (dates, tags, note names).
        #[error("invalid {what} {input:?}: {reason}")]
        Parse {
            what: &'static str,
            input: String,
            reason: String,
        },

        #[error("storage failure at {path:?}: {source}")]
        Storage {
            path: PathBuf,
            #[source]
            source: io::Error,
        },

        #[error("config {path:?}: {reason}")]
        Config { path: PathBuf, reason: String },

        #[error("editor {program:?} failed: {reason}")]
        Editor { program: String, reason: String },

        #[error("archive failed: {reason}")]
        Archive { reason: String },
    }

    impl NoteError {
        pub fn parse(what: &'static str, input: impl Into<String>, reason: impl Into<String>) -> Self {
            Self::Parse {
                what,
                input: input.into(),
                reason: reason.into(),
            }
        }

        pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
            Self::Storage {
                path: path.into(),
                source,
            }
        }

        /// True when the underlying storage error is a missing file.
        pub fn is_not_found(&self) -> bool {
            matches!(self, Self::Storage { source, .. } if source.kind() == io::ErrorKind::NotFound)
        }
    }
}

pub mod date {
    //! Calendar dates in the canonical `YYYY-MM-DD` form.

    use crate::error::{NoteError, NoteResult};
    use chrono::{Datelike, Local, NaiveDate};
    use nom::{
        IResult,
        bytes::complete::take_while_m_n,
        character::complete::char,
        combinator::{all_consuming, map_res},
        error::VerboseError,
        sequence::tuple,
    };
    use std::{fmt, str::FromStr};

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /// A valid Gregorian date between 0001-01-01 and 9999-12-31.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CalendarDate(NaiveDate);

    impl CalendarDate {
        pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
            if !(1..=9999).contains(&year) {
                return None;
            }
            NaiveDate::from_ymd_opt(year, month, day).map(Self)
        }

        /// Current local date.
        pub fn today() -> Self {
            Self(Local::now().date_naive())
        }

        /// 1970-01-01.
        pub fn unix_epoch() -> Self {
            Self(NaiveDate::default())
        }

        /// The day before `self`. Saturates at 0001-01-01.
        pub fn previous_day(self) -> Self {
            self.0
                .pred_opt()
                .and_then(|prev| Self::from_ymd(prev.year(), prev.month(), prev.day()))
                .unwrap_or(self)
        }

        pub fn first_of_month(self) -> Self {
            Self(self.0.with_day(1).unwrap_or(self.0))
        }

        pub fn first_of_year(self) -> Self {
            Self(self.0.with_ordinal(1).unwrap_or(self.0))
        }

        pub fn year(self) -> i32 {
            self.0.year()
        }

        pub fn month(self) -> u32 {
            self.0.month()
        }

        pub fn day(self) -> u32 {
            self.0.day()
        }

        pub fn naive(self) -> NaiveDate {
            self.0
        }
    }

    impl From<CalendarDate> for NaiveDate {
        fn from(value: CalendarDate) -> Self {
            value.0
        }
    }

    impl fmt::Display for CalendarDate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:04}-{:02}-{:02}", self.year(), self.month(), self.day())
        }
    }

    impl FromStr for CalendarDate {
        type Err = NoteError;

        fn from_str(s: &str) -> NoteResult<Self> {
            let (_, (year, _, month, _, day)) = all_consuming(tuple((
                digits::<i32>(4),
                char('-'),
                digits::<u32>(2),
                char('-'),
                digits::<u32>(2),
            )))(s)
            .map_err(|_| NoteError::parse("date", s, "expected YYYY-MM-DD"))?;
            Self::from_ymd(year, month, day)
                .ok_or_else(|| NoteError::parse("date", s, "no such calendar day"))
        }
    }

    /// Parse a `YYYY-MM` month selector.
    pub fn parse_year_month(s: &str) -> NoteResult<(i32, u32)> {
        let (_, (year, _, month)) =
            all_consuming(tuple((digits::<i32>(4), char('-'), digits::<u32>(2))))(s)
                .map_err(|_| NoteError::parse("month", s, "expected YYYY-MM"))?;
        if CalendarDate::from_ymd(year, month, 1).is_none() {
            return Err(NoteError::parse("month", s, "no such month"));
        }
        Ok((year, month))
    }

    fn digits<N: FromStr>(n: usize) -> impl Fn(&str) -> PResult<'_, N> {
        move |i: &str| {
            map_res(take_while_m_n(n, n, |c: char| c.is_ascii_digit()), |s: &str| {
                s.parse::<N>()
            })(i)
        }
    }

}

pub mod document {
    //! Line-level view of a note: section headers and done items.

    use nom::{
        IResult, bytes::complete::tag, combinator::rest, error::VerboseError, sequence::preceded,
    };
    use serde::{Deserialize, Serialize};

    /// Markers that give a note its structure.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct NoteFormat {
        header_marker: String,
        done_marker: String,
    }

    impl Default for NoteFormat {
        fn default() -> Self {
            Self {
                header_marker: "## ".to_string(),
                done_marker: "[x]".to_string(),
            }
        }
    }

    impl NoteFormat {
        pub fn new(header_marker: impl Into<String>, done_marker: impl Into<String>) -> Self {
            Self {
                header_marker: header_marker.into(),
                done_marker: done_marker.into(),
            }
        }

        pub fn header_marker(&self) -> &str {
            &self.header_marker
        }

        pub fn done_marker(&self) -> &str {
            &self.done_marker
        }

        pub fn header_line(&self, name: &str) -> String {
            format!("{}{}", self.header_marker, name)
        }

        /// Section name if `line` is a header line.
        pub fn section_name<'a>(&self, line: &'a str) -> Option<&'a str> {
            let parsed: IResult<&str, &str, VerboseError<&str>> =
                preceded(tag(self.header_marker.as_str()), rest)(line);
            parsed.ok().map(|(_, name)| name.trim_end())
        }

        pub fn is_done(&self, line: &str) -> bool {
            line.trim_end().ends_with(&self.done_marker)
        }

        pub fn validate(&self) -> Result<(), String> {
            if self.header_marker.is_empty() {
                return Err("header_marker must not be empty".to_string());
            }
            if self.done_marker.trim().is_empty() {
                return Err("done_marker must not be blank".to_string());
            }
            Ok(())
        }
    }

    /// The text of one note as an ordered list of lines.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct NoteDocument {
        lines: Vec<String>,
    }

    impl NoteDocument {
        pub fn parse(text: &str) -> Self {
            Self {
                lines: text.lines().map(str::to_string).collect(),
            }
        }

        pub fn lines(&self) -> &[String] {
            &self.lines
        }

        /// Lines of the first section called `name`, minus done lines.
        ///
        /// The block runs until the next header of any section. A missing
        /// section yields an empty list.
        pub fn extract_section(&self, name: &str, format: &NoteFormat) -> Vec<String> {
            let mut lines = self.lines.iter();
            if !lines
                .by_ref()
                .any(|line| format.section_name(line) == Some(name))
            {
                return Vec::new();
            }
            lines
                .take_while(|line| format.section_name(line).is_none())
                .filter(|line| !format.is_done(line))
                .cloned()
                .collect()
        }

        /// Header names in document order.
        pub fn section_names<'a>(&'a self, format: &NoteFormat) -> Vec<&'a str> {
            self.lines
                .iter()
                .filter_map(|line| format.section_name(line))
                .collect()
        }
    }

}

pub mod config {
    //! `NotesConfig`: TOML file, then environment, then CLI flags.

    use crate::date::CalendarDate;
    use crate::document::NoteFormat;
    use crate::error::{NoteError, NoteResult};
    use serde::{Deserialize, Serialize};
    use serde_with::{DisplayFromStr, serde_as};
    use std::{
        collections::BTreeSet,
        fs, io,
        path::{Path, PathBuf},
    };

    /// Which sections a daily note has and which of them roll forward.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct SectionCatalog {
        carryover: Vec<String>,
        reset: Vec<String>,
    }

    impl Default for SectionCatalog {
        fn default() -> Self {
            Self {
                carryover: vec!["To do".to_string(), "Follow up".to_string()],
                reset: vec!["Notes".to_string()],
            }
        }
    }

    impl SectionCatalog {
        pub fn new<I, J>(carryover: I, reset: J) -> Self
        where
            I: IntoIterator,
            I::Item: Into<String>,
            J: IntoIterator,
            J::Item: Into<String>,
        {
            Self {
                carryover: carryover.into_iter().map(Into::into).collect(),
                reset: reset.into_iter().map(Into::into).collect(),
            }
        }

        pub fn carryover(&self) -> &[String] {
            &self.carryover
        }

        /// Sections whose content starts empty in every new note.
        pub fn reset(&self) -> &[String] {
            &self.reset
        }

        pub fn validate(&self) -> Result<(), String> {
            let mut seen = BTreeSet::new();
            for name in self.carryover.iter().chain(&self.reset) {
                if name.trim().is_empty() {
                    return Err("section names must not be blank".to_string());
                }
                if !seen.insert(name.as_str()) {
                    return Err(format!("section {name:?} is listed twice"));
                }
            }
            Ok(())
        }
    }

    #[serde_as]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct NotesConfig {
        pub root: PathBuf,
        /// Template file; `<root>/template.txt` when unset.
        pub template: Option<PathBuf>,
        pub editor: Option<String>,
        pub extension: String,
        /// Oldest date considered when looking for a previous daily note.
        #[serde_as(as = "DisplayFromStr")]
        pub horizon: CalendarDate,
        pub sections: SectionCatalog,
        pub format: NoteFormat,
    }

    impl Default for NotesConfig {
        fn default() -> Self {
            Self {
                root: dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("notes"),
                template: None,
                editor: None,
                extension: "txt".to_string(),
                horizon: CalendarDate::unix_epoch(),
                sections: SectionCatalog::default(),
                format: NoteFormat::default(),
            }
        }
    }

    impl NotesConfig {
        /// `$NOTES_CONFIG`, else `<config dir>/notes/config.toml`.
        pub fn default_path() -> PathBuf {
            if let Ok(path) = std::env::var("NOTES_CONFIG") {
                if !path.is_empty() {
                    return PathBuf::from(path);
                }
            }
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("notes")
                .join("config.toml")
        }

        /// Load from `path`; a missing file means defaults.
        pub fn load_from(path: impl AsRef<Path>) -> NoteResult<Self> {
            let path = path.as_ref();
            let config = match fs::read_to_string(path) {
                Ok(raw) => toml::from_str::<Self>(&raw).map_err(|err| NoteError::Config {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })?,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(?path, "no config file; using defaults");
                    Self::default()
                }
                Err(err) => return Err(NoteError::storage(path, err)),
            };
            config.validate().map_err(|reason| NoteError::Config {
                path: path.to_path_buf(),
                reason,
            })?;
            Ok(config)
        }

        /// Apply `NOTES_DIR` and `NOTES_EDITOR` through `lookup`.
        pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
            if let Some(root) = lookup("NOTES_DIR").filter(|v| !v.is_empty()) {
                self.root = PathBuf::from(root);
            }
            if let Some(editor) = lookup("NOTES_EDITOR").filter(|v| !v.trim().is_empty()) {
                self.editor = Some(editor);
            }
            self
        }

        pub fn template_path(&self) -> PathBuf {
            self.template
                .clone()
                .unwrap_or_else(|| self.root.join("template.txt"))
        }

        /// Configured editor, else `$VISUAL`, else `$EDITOR`, else `vi`.
        pub fn resolved_editor(&self) -> String {
            self.resolved_editor_with(|key| std::env::var(key).ok())
        }

        /// [`NotesConfig::resolved_editor`] reading variables through `lookup`.
        /// Blank values are skipped.
        pub fn resolved_editor_with(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
            let usable = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
            usable(self.editor.clone())
                .or_else(|| usable(lookup("VISUAL")))
                .or_else(|| usable(lookup("EDITOR")))
                .unwrap_or_else(|| "vi".to_string())
        }

        pub fn validate(&self) -> Result<(), String> {
            if self.extension.is_empty() || self.extension.contains(['/', '.']) {
                return Err(format!("invalid extension {:?}", self.extension));
            }
            self.sections.validate()?;
            self.format.validate()
        }
    }

}

pub mod storage {
    //! Storage seam for note files.
    //!
    //! No locking: two processes creating the same note race and the last
    //! rename wins.

    use crate::error::{NoteError, NoteResult};
    use std::{
        fs,
        io::{self, Write},
        path::{Path, PathBuf},
    };
    use tracing::{debug, warn};
    use uuid::Uuid;

    pub trait NoteStore {
        fn exists(&self, path: &Path) -> NoteResult<bool>;

        fn read(&self, path: &Path) -> NoteResult<String>;

        /// Replace `path` with `content`. The parent directory must exist.
        fn write(&self, path: &Path, content: &str) -> NoteResult<()>;

        fn mkdir_all(&self, path: &Path) -> NoteResult<()>;

        /// Direct children of `path`, sorted. A missing directory is empty.
        fn list_dir(&self, path: &Path) -> NoteResult<Vec<PathBuf>>;
    }

    impl<S: NoteStore + ?Sized> NoteStore for &S {
        fn exists(&self, path: &Path) -> NoteResult<bool> {
            (**self).exists(path)
        }

        fn read(&self, path: &Path) -> NoteResult<String> {
            (**self).read(path)
        }

        fn write(&self, path: &Path, content: &str) -> NoteResult<()> {
            (**self).write(path, content)
        }

        fn mkdir_all(&self, path: &Path) -> NoteResult<()> {
            (**self).mkdir_all(path)
        }

        fn list_dir(&self, path: &Path) -> NoteResult<Vec<PathBuf>> {
            (**self).list_dir(path)
        }
    }

    /// Local filesystem store.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FsStore;

    impl NoteStore for FsStore {
        fn exists(&self, path: &Path) -> NoteResult<bool> {
            path.try_exists()
                .map_err(|err| NoteError::storage(path, err))
        }

        /// Invalid UTF-8 is replaced with U+FFFD rather than failing the read.
        fn read(&self, path: &Path) -> NoteResult<String> {
            let bytes = fs::read(path).map_err(|err| NoteError::storage(path, err))?;
            match String::from_utf8(bytes) {
                Ok(text) => Ok(text),
                Err(err) => {
                    warn!(?path, "note is not valid UTF-8; decoding lossily");
                    Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
                }
            }
        }

        /// Writes a uniquely named sibling temp file and renames it over `path`,
        /// so readers see either the old content or the new, never a prefix.
        fn write(&self, path: &Path, content: &str) -> NoteResult<()> {
            let file_name = path.file_name().ok_or_else(|| {
                NoteError::storage(
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?;
            let tmp = path.with_file_name(format!(
                ".{}.{}.tmp",
                file_name.to_string_lossy(),
                Uuid::new_v4().simple()
            ));

            let written = (|| -> io::Result<()> {
                let mut file = fs::File::create(&tmp)?;
                file.write_all(content.as_bytes())?;
                file.sync_all()?;
                fs::rename(&tmp, path)
            })();
            if let Err(err) = written {
                let _ = fs::remove_file(&tmp);
                return Err(NoteError::storage(path, err));
            }
            debug!(?path, bytes = content.len(), "wrote note");
            Ok(())
        }

        fn mkdir_all(&self, path: &Path) -> NoteResult<()> {
            fs::create_dir_all(path).map_err(|err| NoteError::storage(path, err))
        }

        fn list_dir(&self, path: &Path) -> NoteResult<Vec<PathBuf>> {
            let entries = match fs::read_dir(path) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(NoteError::storage(path, err)),
            };
            let mut out = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|err| NoteError::storage(path, err))?;
                out.push(entry.path());
            }
            out.sort();
            Ok(out)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn write_replaces_content_and_leaves_no_temp_files() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("note.txt");
            let store = FsStore;

            store.write(&path, "first\n").expect("write first");
            store.write(&path, "second\n").expect("write second");

            assert_eq!(store.read(&path).expect("read"), "second\n");
            assert_eq!(store.list_dir(tmp.path()).expect("list"), vec![path]);
        }

        #[test]
        fn write_into_missing_directory_is_a_storage_error() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("missing").join("note.txt");
            let err = FsStore.write(&path, "x").unwrap_err();
            assert!(err.is_not_found(), "{err}");
            assert!(!FsStore.exists(&path).expect("exists"));
        }

        #[test]
        fn mkdir_all_is_idempotent_and_missing_dirs_list_empty() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let dir = tmp.path().join("2025").join("01");
            assert!(FsStore.list_dir(&dir).expect("list").is_empty());
            FsStore.mkdir_all(&dir).expect("mkdir");
            FsStore.mkdir_all(&dir).expect("mkdir again");
            assert!(FsStore.exists(&dir).expect("exists"));
        }

        #[test]
        fn invalid_utf8_is_read_lossily() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("latin1.txt");
            fs::write(&path, b"caf\xe9\n").expect("write");
            assert_eq!(FsStore.read(&path).expect("read"), "caf\u{FFFD}\n");
        }

        #[test]
        fn read_of_missing_file_is_not_found() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let err = FsStore.read(&tmp.path().join("nope.txt")).unwrap_err();
            assert!(err.is_not_found());
        }
    }
}

pub mod paths {
    //! Deterministic mapping from notes to storage locations.

    use crate::date::CalendarDate;
    use crate::error::NoteResult;
    use crate::storage::NoteStore;
    use std::path::{Path, PathBuf};

    pub const GENERAL_DIR: &str = "general";

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct NoteLayout {
        root: PathBuf,
        extension: String,
    }

    impl NoteLayout {
        pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
            Self {
                root: root.into(),
                extension: extension.into(),
            }
        }

        pub fn root(&self) -> &Path {
            &self.root
        }

        pub fn extension(&self) -> &str {
            &self.extension
        }

        pub fn year_dir(&self, date: CalendarDate) -> PathBuf {
            self.root.join(format!("{:04}", date.year()))
        }

        pub fn month_dir(&self, date: CalendarDate) -> PathBuf {
            self.year_dir(date).join(format!("{:02}", date.month()))
        }

        /// `<root>/<YYYY>/<MM>/<YYYY-MM-DD>.<ext>`
        pub fn daily_path(&self, date: CalendarDate) -> PathBuf {
            self.month_dir(date)
                .join(format!("{date}.{}", self.extension))
        }

        /// Inverse of [`NoteLayout::daily_path`] for paths it produced.
        pub fn date_of(&self, path: &Path) -> Option<CalendarDate> {
            if path.extension()? != self.extension.as_str() {
                return None;
            }
            let date: CalendarDate = path.file_stem()?.to_str()?.parse().ok()?;
            (self.daily_path(date) == path).then_some(date)
        }

        pub fn general_dir(&self) -> PathBuf {
            self.root.join(GENERAL_DIR)
        }

        pub fn general_path(&self, name: &str) -> PathBuf {
            self.general_dir()
                .join(format!("{name}.{}", self.extension))
        }
    }

    /// Create the parent directory of `path` if needed.
    pub fn ensure_parent<S: NoteStore + ?Sized>(store: &S, path: &Path) -> NoteResult<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => store.mkdir_all(parent),
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn d(s: &str) -> CalendarDate {
            s.parse().expect("date")
        }

        #[test]
        fn daily_path_is_partitioned_by_year_and_month() {
            let layout = NoteLayout::new("/notes", "txt");
            let path = layout.daily_path(d("2025-01-05"));
            assert_eq!(path, PathBuf::from("/notes/2025/01/2025-01-05.txt"));
            assert_eq!(layout.daily_path(d("2025-01-05")), path);
            assert_ne!(layout.daily_path(d("2025-01-06")), path);
        }

        #[test]
        fn date_of_inverts_daily_path_only() {
            let layout = NoteLayout::new("/notes", "txt");
            let date = d("2024-02-29");
            assert_eq!(layout.date_of(&layout.daily_path(date)), Some(date));
            assert_eq!(
                layout.date_of(Path::new("/notes/2024/03/2024-02-29.txt")),
                None
            );
            assert_eq!(
                layout.date_of(Path::new("/notes/2024/02/2024-02-29.md")),
                None
            );
            assert_eq!(layout.date_of(&layout.general_path("ideas")), None);
        }
    }
}

pub mod scan {
    //! Backward search for the closest earlier daily note.

    use crate::date::CalendarDate;
    use crate::error::NoteResult;
    use crate::paths::NoteLayout;
    use crate::storage::NoteStore;
    use tracing::debug;

    /// Closest date strictly before `before` and no older than `horizon`
    /// (inclusive) that has a daily note.
    ///
    /// Walks back one day at a time. Months or years without a directory are
    /// skipped whole since no note inside them can exist.
    pub fn find_most_recent_existing<S: NoteStore + ?Sized>(
        store: &S,
        layout: &NoteLayout,
        before: CalendarDate,
        horizon: CalendarDate,
    ) -> NoteResult<Option<CalendarDate>> {
        let mut current = before;
        let mut known_month = None;
        while current > horizon {
            let candidate = current.previous_day();
            let month = (candidate.year(), candidate.month());
            if known_month != Some(month) {
                if !store.exists(&layout.year_dir(candidate))? {
                    current = candidate.first_of_year();
                    continue;
                }
                if !store.exists(&layout.month_dir(candidate))? {
                    current = candidate.first_of_month();
                    continue;
                }
                known_month = Some(month);
            }
            if store.exists(&layout.daily_path(candidate))? {
                debug!(%before, found = %candidate, "found previous daily note");
                return Ok(Some(candidate));
            }
            current = candidate;
        }
        debug!(%before, %horizon, "no previous daily note");
        Ok(None)
    }

    /// Every daily note date in the store, ascending.
    pub fn daily_dates<S: NoteStore + ?Sized>(
        store: &S,
        layout: &NoteLayout,
    ) -> NoteResult<Vec<CalendarDate>> {
        let mut out = Vec::new();
        let numbered = |path: &std::path::Path, width: usize| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.len() == width && name.bytes().all(|b| b.is_ascii_digit()))
        };
        for year_dir in store.list_dir(layout.root())? {
            if !numbered(&year_dir, 4) {
                continue;
            }
            for month_dir in store.list_dir(&year_dir)? {
                if !numbered(&month_dir, 2) {
                    continue;
                }
                for file in store.list_dir(&month_dir)? {
                    if let Some(date) = layout.date_of(&file) {
                        out.push(date);
                    }
                }
            }
        }
        out.sort();
        Ok(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::testing::MemoryStore;

        fn d(s: &str) -> CalendarDate {
            s.parse().expect("date")
        }

        fn layout() -> NoteLayout {
            NoteLayout::new("/notes", "txt")
        }

        fn store_with(dates: &[&str]) -> MemoryStore {
            let layout = layout();
            dates.iter().fold(MemoryStore::default(), |store, date| {
                store.with_file(layout.daily_path(d(date)), "note")
            })
        }

        /// Day-by-day reference scan with no directory shortcuts.
        fn naive_scan(
            store: &MemoryStore,
            before: CalendarDate,
            horizon: CalendarDate,
        ) -> Option<CalendarDate> {
            let mut current = before;
            while current > horizon {
                current = current.previous_day();
                if store.exists(&layout().daily_path(current)).unwrap() {
                    return Some(current);
                }
            }
            None
        }

        #[test]
        fn empty_store_finds_nothing_quickly() {
            let store = MemoryStore::default();
            let found =
                find_most_recent_existing(&store, &layout(), d("2025-01-05"), d("1970-01-01"))
                    .expect("scan");
            assert_eq!(found, None);
            // One year-directory probe per year, not one per day.
            assert!(store.probes() < 100, "probes: {}", store.probes());
        }

        #[test]
        fn finds_the_note_across_a_gap() {
            let store = store_with(&["2024-12-20", "2025-01-03"]);
            let found =
                find_most_recent_existing(&store, &layout(), d("2025-01-05"), d("1970-01-01"))
                    .expect("scan");
            assert_eq!(found, Some(d("2025-01-03")));
        }

        #[test]
        fn exactly_one_note_n_days_back() {
            let target = d("2025-03-01");
            for gap in [1_usize, 2, 31, 400] {
                let mut prior = target;
                for _ in 0..gap {
                    prior = prior.previous_day();
                }
                let store = store_with(&[&prior.to_string()]);
                let found =
                    find_most_recent_existing(&store, &layout(), target, d("1970-01-01"))
                        .expect("scan");
                assert_eq!(found, Some(prior), "gap {gap}");
            }
        }

        #[test]
        fn the_target_date_itself_is_never_returned() {
            let store = store_with(&["2025-01-05"]);
            let found =
                find_most_recent_existing(&store, &layout(), d("2025-01-05"), d("1970-01-01"))
                    .expect("scan");
            assert_eq!(found, None);
        }

        #[test]
        fn horizon_is_inclusive_and_bounds_the_search() {
            let store = store_with(&["2020-01-01"]);
            let at = find_most_recent_existing(&store, &layout(), d("2025-01-05"), d("2020-01-01"))
                .expect("scan");
            assert_eq!(at, Some(d("2020-01-01")));

            let past = find_most_recent_existing(&store, &layout(), d("2025-01-05"), d("2020-01-02"))
                .expect("scan");
            assert_eq!(past, None);

            let before_horizon =
                find_most_recent_existing(&store, &layout(), d("2019-01-01"), d("2020-01-01"))
                    .expect("scan");
            assert_eq!(before_horizon, None);
        }

        #[test]
        fn directory_shortcuts_match_the_day_by_day_scan() {
            let store = store_with(&[
                "2023-02-28",
                "2023-03-01",
                "2024-02-29",
                "2024-07-15",
                "2025-01-01",
            ]);
            let horizon = d("2022-12-01");
            let mut before = d("2025-02-10");
            while before > horizon {
                let fast = find_most_recent_existing(&store, &layout(), before, horizon)
                    .expect("scan");
                assert_eq!(fast, naive_scan(&store, before, horizon), "before {before}");
                before = before.previous_day();
            }
        }

        #[test]
        fn daily_dates_lists_only_daily_notes_in_order() {
            let layout = layout();
            let store = store_with(&["2025-01-03", "2024-12-31", "2025-01-01"])
                .with_file(layout.general_path("ideas"), "x")
                .with_file("/notes/2025/01/.2025-01-03.txt.abc.tmp", "partial")
                .with_file("/notes/2025/01/README", "x")
                .with_file("/notes/template.txt", "x");
            assert_eq!(
                daily_dates(&store, &layout).expect("list"),
                vec![d("2024-12-31"), d("2025-01-01"), d("2025-01-03")]
            );
        }
    }
}

pub mod template {
    //! Builds the text of a new daily note.
    //!
    //! Templates use `{{date}}` and `{{section:<name>}}` placeholders. Anything
    //! else between braces is left as written.

    use crate::config::SectionCatalog;
    use crate::date::CalendarDate;
    use crate::document::NoteFormat;
    use indexmap::IndexMap;
    use std::fmt::Write;

    pub const DATE_TOKEN: &str = "{{date}}";

    pub fn section_token(name: &str) -> String {
        format!("{{{{section:{name}}}}}")
    }

    /// Closed token → text table applied in a single pass.
    #[derive(Debug, Clone, Default)]
    pub struct Substitutions {
        table: IndexMap<String, String>,
    }

    impl Substitutions {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
            self.table.insert(token.into(), value.into());
        }

        /// Replace known tokens left to right. Inserted text is not rescanned.
        pub fn apply(&self, text: &str) -> String {
            let mut out = String::with_capacity(text.len());
            let mut rest = text;
            while let Some(open) = rest.find("{{") {
                out.push_str(&rest[..open]);
                let candidate = &rest[open..];
                let Some(close) = candidate.find("}}") else {
                    rest = candidate;
                    break;
                };
                let token = &candidate[..close + 2];
                match self.table.get(token) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &candidate[token.len()..];
                    }
                    None => {
                        out.push('{');
                        rest = &candidate[1..];
                    }
                }
            }
            out.push_str(rest);
            out
        }
    }

    /// Text of a new note for `date`.
    ///
    /// `carryover` maps carryover section names to the lines taken from the
    /// previous note; missing entries count as empty.
    pub fn instantiate(
        template: Option<&str>,
        date: CalendarDate,
        carryover: &IndexMap<String, Vec<String>>,
        catalog: &SectionCatalog,
        format: &NoteFormat,
    ) -> String {
        match template {
            Some(template) => {
                let mut subs = Substitutions::new();
                subs.insert(DATE_TOKEN, date.to_string());
                for name in catalog.carryover() {
                    subs.insert(section_token(name), carried_text(carryover.get(name)));
                }
                for name in catalog.reset() {
                    subs.insert(section_token(name), "");
                }
                subs.apply(template)
            }
            None => builtin_layout(date, carryover, catalog, format),
        }
    }

    fn builtin_layout(
        date: CalendarDate,
        carryover: &IndexMap<String, Vec<String>>,
        catalog: &SectionCatalog,
        format: &NoteFormat,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {date}");
        out.push('\n');
        for name in catalog.carryover() {
            let _ = writeln!(out, "{}", format.header_line(name));
            let text = carried_text(carryover.get(name));
            if !text.is_empty() {
                let _ = writeln!(out, "{text}");
            }
            out.push('\n');
        }
        for name in catalog.reset() {
            let _ = writeln!(out, "{}", format.header_line(name));
            out.push('\n');
        }
        out
    }

    /// Carried lines joined by newlines, without trailing blank lines.
    fn carried_text(lines: Option<&Vec<String>>) -> String {
        let Some(lines) = lines else {
            return String::new();
        };
        let keep = lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |idx| idx + 1);
        lines[..keep].join("\n")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn date() -> CalendarDate {
            "2025-01-05".parse().expect("date")
        }

        fn carried(pairs: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
            pairs
                .iter()
                .map(|(name, lines)| {
                    (
                        name.to_string(),
                        lines.iter().map(|l| l.to_string()).collect(),
                    )
                })
                .collect()
        }

        #[test]
        fn builtin_layout_lists_carryover_then_reset_sections() {
            let catalog = SectionCatalog::new(["To do", "Follow up"], ["Notes"]);
            let text = instantiate(
                None,
                date(),
                &carried(&[("To do", &["buy milk", ""]), ("Follow up", &[])]),
                &catalog,
                &NoteFormat::default(),
            );
            assert_eq!(
                text,
                "# 2025-01-05\n\n## To do\nbuy milk\n\n## Follow up\n\n## Notes\n\n"
            );
        }

        #[test]
        fn builtin_layout_without_prior_content_has_empty_sections() {
            let catalog = SectionCatalog::default();
            let text = instantiate(
                None,
                date(),
                &IndexMap::new(),
                &catalog,
                &NoteFormat::default(),
            );
            assert_eq!(
                text,
                "# 2025-01-05\n\n## To do\n\n## Follow up\n\n## Notes\n\n"
            );
        }

        #[test]
        fn template_placeholders_are_substituted() {
            let catalog = SectionCatalog::new(["To do"], ["Notes"]);
            let template = "Day {{date}}\n## To do\n{{section:To do}}\n## Notes\n{{section:Notes}}\n";
            let text = instantiate(
                Some(template),
                date(),
                &carried(&[("To do", &["a", "b"])]),
                &catalog,
                &NoteFormat::default(),
            );
            assert_eq!(text, "Day 2025-01-05\n## To do\na\nb\n## Notes\n\n");
        }

        #[test]
        fn unknown_placeholders_stay_verbatim() {
            let catalog = SectionCatalog::new(["To do"], Vec::<String>::new());
            let template = "{{date}} {{section:Ideas}} {{weather}} {{section:To do}} {{ unclosed";
            let text = instantiate(
                Some(template),
                date(),
                &IndexMap::new(),
                &catalog,
                &NoteFormat::default(),
            );
            assert_eq!(text, "2025-01-05 {{section:Ideas}} {{weather}}  {{ unclosed");
        }

        #[test]
        fn substituted_text_is_not_rescanned() {
            let catalog = SectionCatalog::new(["To do"], Vec::<String>::new());
            let text = instantiate(
                Some("{{section:To do}}"),
                date(),
                &carried(&[("To do", &["literal {{date}}"])]),
                &catalog,
                &NoteFormat::default(),
            );
            assert_eq!(text, "literal {{date}}");
        }

        #[test]
        fn repeated_tokens_are_all_replaced() {
            let mut subs = Substitutions::new();
            subs.insert("{{x}}", "1");
            assert_eq!(subs.apply("{{x}}{{x}} {{{x}}"), "11 {1");
        }
    }
}

pub mod editor {
    //! Hand-off to an external editor.

    use crate::error::{NoteError, NoteResult};
    use std::path::Path;
    use std::process::Command;
    use tracing::debug;

    pub trait Editor {
        /// Edit `path`, returning once the editor exits.
        fn edit(&self, path: &Path) -> NoteResult<()>;
    }

    /// Runs a command line such as `vim` or `code --wait` with the path appended.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CommandEditor {
        program: String,
    }

    impl CommandEditor {
        pub fn new(program: impl Into<String>) -> Self {
            Self {
                program: program.into(),
            }
        }

        pub fn program(&self) -> &str {
            &self.program
        }
    }

    impl Editor for CommandEditor {
        fn edit(&self, path: &Path) -> NoteResult<()> {
            let failed = |reason: String| NoteError::Editor {
                program: self.program.clone(),
                reason,
            };
            let mut parts = self.program.split_whitespace();
            let Some(bin) = parts.next() else {
                return Err(failed("empty editor command".to_string()));
            };
            debug!(program = %self.program, ?path, "launching editor");
            let status = Command::new(bin)
                .args(parts)
                .arg(path)
                .status()
                .map_err(|err| failed(err.to_string()))?;
            if !status.success() {
                return Err(failed(format!("exited with {status}")));
            }
            Ok(())
        }
    }

}

pub mod daily {
    //! Opening a daily note: resolve, reuse or create, then hand to the editor.

    use crate::config::{NotesConfig, SectionCatalog};
    use crate::date::CalendarDate;
    use crate::document::{NoteDocument, NoteFormat};
    use crate::editor::Editor;
    use crate::error::NoteResult;
    use crate::paths::{NoteLayout, ensure_parent};
    use crate::scan::find_most_recent_existing;
    use crate::storage::NoteStore;
    use crate::template::instantiate;
    use indexmap::IndexMap;
    use std::path::PathBuf;
    use tracing::{debug, info};

    /// How a note reached the ready state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OpenState {
        /// Already on storage; left untouched.
        Existing,
        /// Generated now, seeded from `carried_from` if any.
        Created { carried_from: Option<CalendarDate> },
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct OpenedNote {
        pub date: CalendarDate,
        pub path: PathBuf,
        pub state: OpenState,
    }

    pub struct DailyNotes<S> {
        store: S,
        layout: NoteLayout,
        catalog: SectionCatalog,
        format: NoteFormat,
        template: Option<PathBuf>,
        horizon: CalendarDate,
    }

    impl<S: NoteStore> DailyNotes<S> {
        pub fn new(store: S, layout: NoteLayout, catalog: SectionCatalog, format: NoteFormat) -> Self {
            Self {
                store,
                layout,
                catalog,
                format,
                template: None,
                horizon: CalendarDate::unix_epoch(),
            }
        }

        pub fn from_config(store: S, config: &NotesConfig) -> Self {
            Self::new(
                store,
                NoteLayout::new(&config.root, &config.extension),
                config.sections.clone(),
                config.format.clone(),
            )
            .with_template(config.template_path())
            .with_horizon(config.horizon)
        }

        /// Template file read on every creation; a missing file means the built-in layout.
        pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
            self.template = Some(path.into());
            self
        }

        pub fn with_horizon(mut self, horizon: CalendarDate) -> Self {
            self.horizon = horizon;
            self
        }

        pub fn layout(&self) -> &NoteLayout {
            &self.layout
        }

        pub fn store(&self) -> &S {
            &self.store
        }

        /// Make sure the note for `date` exists. Existing notes are never rewritten.
        pub fn prepare(&self, date: CalendarDate) -> NoteResult<OpenedNote> {
            let path = self.layout.daily_path(date);
            debug!(%date, ?path, "path resolved");

            let state = if self.store.exists(&path)? {
                debug!(%date, "existing note");
                OpenState::Existing
            } else {
                let (text, carried_from) = self.render_new(date)?;
                ensure_parent(&self.store, &path)?;
                self.store.write(&path, &text)?;
                info!(%date, ?carried_from, ?path, "created daily note");
                OpenState::Created { carried_from }
            };

            Ok(OpenedNote { date, path, state })
        }

        /// [`DailyNotes::prepare`], then run `editor` on the note.
        pub fn open(&self, date: CalendarDate, editor: &dyn Editor) -> NoteResult<OpenedNote> {
            let note = self.prepare(date)?;
            editor.edit(&note.path)?;
            Ok(note)
        }

        /// Text a new note for `date` would get, and the note it carries from.
        pub fn render_new(&self, date: CalendarDate) -> NoteResult<(String, Option<CalendarDate>)> {
            let previous =
                find_most_recent_existing(&self.store, &self.layout, date, self.horizon)?;

            let mut carryover = IndexMap::new();
            if let Some(previous) = previous {
                let text = self.store.read(&self.layout.daily_path(previous))?;
                let doc = NoteDocument::parse(&text);
                for name in self.catalog.carryover() {
                    carryover.insert(name.clone(), doc.extract_section(name, &self.format));
                }
            }

            let template = self.load_template()?;
            let text = instantiate(
                template.as_deref(),
                date,
                &carryover,
                &self.catalog,
                &self.format,
            );
            Ok((text, previous))
        }

        fn load_template(&self) -> NoteResult<Option<String>> {
            let Some(path) = &self.template else {
                return Ok(None);
            };
            match self.store.read(path) {
                Ok(text) => Ok(Some(text)),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            }
        }
    }

}

pub mod general {
    //! Free-form notes under `<root>/general/`, tagged by a `tags:` line.

    use crate::error::{NoteError, NoteResult};
    use crate::paths::{NoteLayout, ensure_parent};
    use crate::storage::NoteStore;
    use indexmap::IndexSet;
    use nom::{
        IResult, bytes::complete::tag, character::complete::space0, combinator::rest,
        error::VerboseError, sequence::tuple,
    };
    use std::path::PathBuf;
    use tracing::info;

    const TAGS_PREFIX: &str = "tags:";

    pub fn validate_name(name: &str) -> NoteResult<()> {
        if name.trim().is_empty() {
            return Err(NoteError::parse("note name", name, "must not be empty"));
        }
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(NoteError::parse(
                "note name",
                name,
                "must not contain path separators or start with '.'",
            ));
        }
        Ok(())
    }

    /// Drops a leading `#`; otherwise tags are kept as typed.
    pub fn normalize_tag(raw: &str) -> NoteResult<String> {
        let tag = raw.trim().trim_start_matches('#');
        if tag.is_empty() || tag.contains(char::is_whitespace) {
            return Err(NoteError::parse("tag", raw, "tags are single non-empty words"));
        }
        Ok(tag.to_string())
    }

    fn tags_in_line(line: &str) -> Option<IndexSet<String>> {
        let parsed: IResult<&str, (&str, &str, &str), VerboseError<&str>> =
            tuple((tag(TAGS_PREFIX), space0, rest))(line);
        let (_, (_, _, body)) = parsed.ok()?;
        Some(
            body.split_whitespace()
                .filter_map(|t| normalize_tag(t).ok())
                .collect(),
        )
    }

    /// Tags of a general note's text.
    pub fn parse_tags(text: &str) -> IndexSet<String> {
        text.lines().find_map(tags_in_line).unwrap_or_default()
    }

    fn tags_line(tags: &IndexSet<String>) -> String {
        let mut line = TAGS_PREFIX.to_string();
        for tag in tags {
            line.push(' ');
            line.push_str(tag);
        }
        line
    }

    /// Replace the first `tags:` line, or insert one after the title line.
    fn rewrite_tags(text: &str, tags: &IndexSet<String>) -> String {
        let new_line = tags_line(tags);
        let mut out = String::with_capacity(text.len() + new_line.len() + 1);
        let mut replaced = false;
        for line in text.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            if !replaced && tags_in_line(body).is_some() {
                out.push_str(&new_line);
                out.push_str(&line[body.len()..]);
                replaced = true;
            } else {
                out.push_str(line);
            }
        }
        if replaced {
            return out;
        }

        match text.split_once('\n') {
            Some((title, body)) => format!("{title}\n{new_line}\n{body}"),
            None if text.is_empty() => format!("{new_line}\n"),
            None => format!("{text}\n{new_line}\n"),
        }
    }

    pub struct GeneralNotes<S> {
        store: S,
        layout: NoteLayout,
    }

    impl<S: NoteStore> GeneralNotes<S> {
        pub fn new(store: S, layout: NoteLayout) -> Self {
            Self { store, layout }
        }

        pub fn path_of(&self, name: &str) -> NoteResult<PathBuf> {
            validate_name(name)?;
            Ok(self.layout.general_path(name))
        }

        /// Create `name` with a title and tags line unless it already exists.
        /// Returns the path and whether the note was created.
        pub fn create_or_open(&self, name: &str, tags: &[String]) -> NoteResult<(PathBuf, bool)> {
            let path = self.path_of(name)?;
            let tags = tags
                .iter()
                .map(|t| normalize_tag(t))
                .collect::<NoteResult<IndexSet<_>>>()?;
            if self.store.exists(&path)? {
                if !tags.is_empty() {
                    let tags: Vec<String> = tags.into_iter().collect();
                    self.add_tags(name, &tags)?;
                }
                return Ok((path, false));
            }
            ensure_parent(&self.store, &path)?;
            let text = format!("# {name}\n{}\n\n", tags_line(&tags));
            self.store.write(&path, &text)?;
            info!(name, ?path, "created general note");
            Ok((path, true))
        }

        /// Names of all general notes, sorted.
        pub fn list(&self) -> NoteResult<Vec<String>> {
            let mut names: Vec<String> = self
                .store
                .list_dir(&self.layout.general_dir())?
                .into_iter()
                .filter(|p| p.extension().is_some_and(|e| e == self.layout.extension()))
                .filter_map(|p| p.file_stem()?.to_str().map(str::to_string))
                .filter(|n| !n.starts_with('.'))
                .collect();
            names.sort();
            Ok(names)
        }

        pub fn tags(&self, name: &str) -> NoteResult<IndexSet<String>> {
            let text = self.store.read(&self.path_of(name)?)?;
            Ok(parse_tags(&text))
        }

        pub fn search_by_tag(&self, tag: &str) -> NoteResult<Vec<String>> {
            let wanted = normalize_tag(tag)?;
            let mut hits = Vec::new();
            for name in self.list()? {
                if self.tags(&name)?.contains(&wanted) {
                    hits.push(name);
                }
            }
            Ok(hits)
        }

        pub fn add_tags(&self, name: &str, tags: &[String]) -> NoteResult<IndexSet<String>> {
            self.update_tags(name, |current| {
                for tag in tags {
                    current.insert(normalize_tag(tag)?);
                }
                Ok(())
            })
        }

        pub fn remove_tags(&self, name: &str, tags: &[String]) -> NoteResult<IndexSet<String>> {
            self.update_tags(name, |current| {
                for tag in tags {
                    current.shift_remove(&normalize_tag(tag)?);
                }
                Ok(())
            })
        }

        fn update_tags(
            &self,
            name: &str,
            change: impl FnOnce(&mut IndexSet<String>) -> NoteResult<()>,
        ) -> NoteResult<IndexSet<String>> {
            let path = self.path_of(name)?;
            let text = self.store.read(&path)?;
            let mut tags = parse_tags(&text);
            change(&mut tags)?;
            self.store.write(&path, &rewrite_tags(&text, &tags))?;
            Ok(tags)
        }
    }

}

pub mod calendar {
    //! Month grid marking the days that have a daily note.

    use crate::date::CalendarDate;
    use crate::error::{NoteError, NoteResult};
    use chrono::{Datelike, Month};
    use std::fmt::Write;

    const WEEK_HEADER: &str = "Mo  Tu  We  Th  Fr  Sa  Su";

    /// Monday-first grid for `year`-`month`; days with a note get a `*`.
    pub fn render_month(
        year: i32,
        month: u32,
        has_note: impl Fn(CalendarDate) -> bool,
    ) -> NoteResult<String> {
        let invalid = || NoteError::parse("month", format!("{year:04}-{month:02}"), "no such month");
        let first = CalendarDate::from_ymd(year, month, 1).ok_or_else(invalid)?;
        let name = u8::try_from(month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .ok_or_else(invalid)?
            .name();

        let mut out = String::new();
        let _ = writeln!(out, "{name} {year}");
        let _ = writeln!(out, "{WEEK_HEADER}");

        let lead = first.naive().weekday().num_days_from_monday() as usize;
        let mut row = "    ".repeat(lead);
        let mut column = lead;
        let mut day = first;
        while day.month() == month && day.year() == year {
            let mark = if has_note(day) { '*' } else { ' ' };
            let _ = write!(row, "{:>2}{mark} ", day.day());
            column += 1;
            if column == 7 {
                let _ = writeln!(out, "{}", row.trim_end());
                row.clear();
                column = 0;
            }
            match day.naive().succ_opt().and_then(|n| {
                CalendarDate::from_ymd(n.year(), n.month(), n.day())
            }) {
                Some(next) => day = next,
                None => break,
            }
        }
        if column > 0 {
            let _ = writeln!(out, "{}", row.trim_end());
        }
        Ok(out)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn february_2025_starts_on_saturday() {
            let marked: CalendarDate = "2025-02-03".parse().unwrap();
            let grid = render_month(2025, 2, |d| d == marked).expect("render");
            let lines: Vec<&str> = grid.lines().collect();
            assert_eq!(lines[0], "February 2025");
            assert_eq!(lines[1], WEEK_HEADER);
            assert_eq!(lines[2], format!("{}1   2", " ".repeat(21)));
            assert_eq!(lines[3], " 3*  4   5   6   7   8   9");
            assert_eq!(lines.last().copied(), Some("24  25  26  27  28"));
            assert_eq!(lines.len(), 2 + 5);
        }

        #[test]
        fn leap_february_and_invalid_months() {
            let grid = render_month(2024, 2, |_| false).unwrap();
            assert!(grid.trim_end().ends_with("29"), "{grid}");
            assert!(render_month(2024, 13, |_| false).is_err());
            assert!(render_month(2024, 0, |_| false).is_err());
        }
    }
}

pub mod summary {
    //! Counts over the whole note store.

    use crate::config::SectionCatalog;
    use crate::date::CalendarDate;
    use crate::document::{NoteDocument, NoteFormat};
    use crate::error::NoteResult;
    use crate::general::GeneralNotes;
    use crate::paths::NoteLayout;
    use crate::scan::daily_dates;
    use crate::storage::NoteStore;
    use serde::Serialize;
    use serde_with::{DisplayFromStr, serde_as};
    use std::collections::BTreeMap;

    #[serde_as]
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
    pub struct Summary {
        pub daily_notes: usize,
        pub per_year: BTreeMap<i32, usize>,
        pub general_notes: usize,
        #[serde_as(as = "Option<DisplayFromStr>")]
        pub first_daily: Option<CalendarDate>,
        #[serde_as(as = "Option<DisplayFromStr>")]
        pub last_daily: Option<CalendarDate>,
        /// Non-blank, not-done lines in the carryover sections of the latest note.
        pub open_items: usize,
    }

    pub fn summarize<S: NoteStore>(
        store: &S,
        layout: &NoteLayout,
        catalog: &SectionCatalog,
        format: &NoteFormat,
    ) -> NoteResult<Summary> {
        let dates = daily_dates(store, layout)?;
        let mut summary = Summary {
            daily_notes: dates.len(),
            first_daily: dates.first().copied(),
            last_daily: dates.last().copied(),
            general_notes: GeneralNotes::new(store, layout.clone()).list()?.len(),
            ..Summary::default()
        };
        for date in &dates {
            *summary.per_year.entry(date.year()).or_default() += 1;
        }
        if let Some(last) = summary.last_daily {
            let doc = NoteDocument::parse(&store.read(&layout.daily_path(last))?);
            summary.open_items = catalog
                .carryover()
                .iter()
                .flat_map(|name| doc.extract_section(name, format))
                .filter(|line| !line.trim().is_empty())
                .count();
        }
        Ok(summary)
    }

}

pub mod archive {
    //! Whole-store archives through the system `tar`.

    use crate::error::{NoteError, NoteResult};
    use std::path::Path;
    use std::process::Command;
    use tracing::info;

    /// Write `<output>` as a gzip tarball of everything under `root`.
    pub fn create_archive(root: &Path, output: &Path) -> NoteResult<()> {
        let root_abs = root
            .canonicalize()
            .map_err(|err| NoteError::storage(root, err))?;
        let out_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let out_dir_abs = out_dir
            .canonicalize()
            .map_err(|err| NoteError::storage(out_dir, err))?;
        if out_dir_abs.starts_with(&root_abs) {
            return Err(NoteError::Archive {
                reason: format!("{output:?} is inside the note root {root:?}"),
            });
        }

        let status = Command::new("tar")
            .arg("-czf")
            .arg(output)
            .arg("-C")
            .arg(&root_abs)
            .arg(".")
            .status()
            .map_err(|err| NoteError::Archive {
                reason: format!("running tar: {err}"),
            })?;
        if !status.success() {
            return Err(NoteError::Archive {
                reason: format!("tar exited with {status}"),
            });
        }
        info!(?root, ?output, "archived note store");
        Ok(())
    }

}
