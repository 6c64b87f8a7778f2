use anyhow::{Context, Result, anyhow};
use ignore::{Walk, WalkBuilder};
use memmap2::Mmap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ARCHIVE_EXTENSIONS: [&str; 3] = ["jar", "jmod", "zip"];

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// One compiled class file and the name it is reported under: the file
/// path, or `archive:entry` for archive members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Streams every compiled unit under a list of roots.
///
/// Roots are visited in order. Directories are walked recursively with
/// shorter file names first, so `Foo.class` precedes `Foo$Bar.class`.
/// Archives are opened lazily and yield their `.class` entries, minus
/// `META-INF/` and `module-info.class`. Other files are skipped.
///
/// The first error ends the walk.
pub struct UnitWalker {
    roots: VecDeque<PathBuf>,
    walk: Option<Walk>,
    archive: Option<ArchiveUnits>,
    archives: bool,
    done: bool,
}

impl UnitWalker {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            walk: None,
            archive: None,
            archives: true,
            done: false,
        }
    }

    /// When disabled, archives are skipped like any other non-class file.
    pub fn check_archives(mut self, enabled: bool) -> Self {
        self.archives = enabled;
        self
    }

    fn visit_file(&mut self, path: &Path) -> Option<Result<CompiledUnit>> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if extension == "class" {
            let unit = std::fs::read(path)
                .with_context(|| format!("Failed to read class file: {}", path.display()))
                .map(|bytes| CompiledUnit {
                    name: path.display().to_string(),
                    bytes,
                });
            return Some(unit);
        }

        if self.archives && ARCHIVE_EXTENSIONS.contains(&extension) {
            match ArchiveUnits::open(path) {
                Ok(archive) => self.archive = Some(archive),
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }

    fn next_unit(&mut self) -> Option<Result<CompiledUnit>> {
        loop {
            if let Some(archive) = &mut self.archive {
                match archive.next() {
                    Some(unit) => return Some(unit),
                    None => self.archive = None,
                }
                continue;
            }

            if let Some(walk) = &mut self.walk {
                match walk.next() {
                    Some(Ok(entry)) => {
                        if entry.file_type().is_some_and(|t| t.is_file()) {
                            let path = entry.into_path();
                            if let Some(unit) = self.visit_file(&path) {
                                return Some(unit);
                            }
                        }
                    }
                    Some(Err(err)) => return Some(Err(anyhow!(err).context("Failed to walk directory"))),
                    None => self.walk = None,
                }
                continue;
            }

            let root = self.roots.pop_front()?;
            if root.is_dir() {
                self.walk = Some(directory_walk(&root));
            } else if root.is_file() {
                if let Some(unit) = self.visit_file(&root) {
                    return Some(unit);
                }
            } else {
                return Some(Err(anyhow!("Path does not exist: {}", root.display())));
            }
        }
    }
}

impl Iterator for UnitWalker {
    type Item = Result<CompiledUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_unit();
        if matches!(next, None | Some(Err(_))) {
            self.done = true;
        }
        next
    }
}

fn directory_walk(root: &Path) -> Walk {
    WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .build()
}

/// Lazily yields the class entries of one archive.
struct ArchiveUnits {
    label: String,
    archive: ZipArchive<Cursor<Mmap>>,
    index: usize,
}

impl ArchiveUnits {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open archive: {}", path.display()))?;
        // SAFETY: The file is opened read-only and the map is owned by the
        // archive reader, which never hands out references past its lifetime.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap archive: {}", path.display()))?;
        let archive = ZipArchive::new(Cursor::new(mmap))
            .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;
        Ok(Self {
            label: path.display().to_string(),
            archive,
            index: 0,
        })
    }
}

impl Iterator for ArchiveUnits {
    type Item = Result<CompiledUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;

            let mut entry = match self.archive.by_index(index) {
                Ok(entry) => entry,
                Err(err) => {
                    return Some(Err(anyhow!(err).context(format!(
                        "Failed to read entry #{index} of {}",
                        self.label
                    ))));
                }
            };
            let entry_name = entry.name().to_string();
            if !is_class_entry(&entry_name) || entry.is_dir() {
                continue;
            }

            let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
            let name = format!("{}:{entry_name}", self.label);
            return Some(
                entry
                    .read_to_end(&mut bytes)
                    .with_context(|| format!("Failed to inflate {name}"))
                    .map(|_| CompiledUnit { name, bytes }),
            );
        }
        None
    }
}

/// The declared size comes from the archive header and is not trusted.
fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOCATION)).unwrap_or(0)
}

fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
        && !name.starts_with("META-INF/")
        && name.rsplit('/').next() != Some("module-info.class")
}
