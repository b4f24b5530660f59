// File categories - routes a file name to its destination folder

use std::path::Path;

/// One destination category
#[derive(Debug, PartialEq, Eq)]
pub struct FileCategory {
    pub key: &'static str,
    /// Lowercase, with leading dot
    pub extensions: &'static [&'static str],
    pub folder: &'static str,
}

impl FileCategory {
    pub fn matches(&self, ext: &str) -> bool {
        self.extensions.contains(&ext)
    }
}

/// Scanned in order. `other` is the catch-all and must stay last.
pub static CATEGORIES: &[FileCategory] = &[
    FileCategory {
        key: "images",
        extensions: &[
            ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".tiff", ".ico", ".heic", ".avif",
        ],
        folder: "Images",
    },
    FileCategory {
        key: "music",
        extensions: &[".mp3", ".flac", ".ogg", ".wav", ".aac", ".m4a", ".wma", ".opus", ".alac"],
        folder: "Music",
    },
    FileCategory {
        key: "videos",
        extensions: &[".mp4", ".webm", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".m4v", ".3gp", ".ogv"],
        folder: "Videos",
    },
    FileCategory {
        key: "documents",
        extensions: &[".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".xls", ".xlsx", ".ppt", ".pptx"],
        folder: "Documents",
    },
    FileCategory {
        key: "archives",
        extensions: &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz"],
        folder: "Archives",
    },
    FileCategory {
        key: "other",
        extensions: &[],
        folder: "Other",
    },
];

/// The catch-all category
pub fn other() -> &'static FileCategory {
    &CATEGORIES[CATEGORIES.len() - 1]
}

/// Category for a file name, by lowercase extension
pub fn category_for(filename: &str) -> &'static FileCategory {
    let ext = match Path::new(filename).extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy().to_lowercase()),
        None => return other(),
    };

    CATEGORIES
        .iter()
        .find(|c| c.matches(&ext))
        .unwrap_or_else(other)
}

/// Folder name for a file name
pub fn folder_for(filename: &str) -> &'static str {
    category_for(filename).folder
}
