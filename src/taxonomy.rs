//! Classification taxonomy: the closed, ordered set of category tags.
//!
//! Each tag carries an ordered extension list, an ordered list of
//! MIME-prefix patterns, a thumbnail eligibility flag, and a description.
//! The order of tags is significant: classification scans top to bottom,
//! so more specific tags (`videos_mp4`) must precede more general ones
//! (`videos_other`). The `other` tag is the required fallback.
//!
//! The set is immutable for the process lifetime. It can be loaded from a
//! declarative TOML file:
//!
//! ```toml
//! [[category]]
//! name = "photos"
//! extensions = [".jpg", ".jpeg", ".png"]
//! mime_patterns = ["image/jpeg", "image/png"]
//! thumbable = true
//! description = "Photographic images"
//! ```
//!
//! or taken from [`Taxonomy::builtin`], which ships the default set.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{DepotError, Result};
use crate::sniff;

/// One category tag in the taxonomy.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub mime_patterns: Vec<String>,
    #[serde(default)]
    pub thumbable: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    category: Vec<CategorySpec>,
}

/// Which signal decided the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Extension,
    Mime,
    Magic,
    Default,
}

impl MatchedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchedBy::Extension => "extension",
            MatchedBy::Mime => "mime",
            MatchedBy::Magic => "magic",
            MatchedBy::Default => "default",
        }
    }
}

/// Result of classifying one file.
#[derive(Debug, Clone)]
pub struct Classification<'a> {
    pub category: &'a CategorySpec,
    pub matched_by: MatchedBy,
    /// The MIME type the pipeline should record for the file.
    pub effective_mime: String,
}

/// The loaded, ordered taxonomy.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<CategorySpec>,
    by_name: HashMap<String, usize>,
}

impl Taxonomy {
    /// Build a taxonomy from an ordered category list.
    ///
    /// Fails with `Internal` if the required `other` fallback is missing
    /// or a name appears twice.
    pub fn from_specs(categories: Vec<CategorySpec>) -> Result<Taxonomy> {
        let mut by_name = HashMap::with_capacity(categories.len());
        for (i, cat) in categories.iter().enumerate() {
            if by_name.insert(cat.name.clone(), i).is_some() {
                return Err(DepotError::Internal(format!(
                    "duplicate taxonomy category: {}",
                    cat.name
                )));
            }
        }
        if !by_name.contains_key("other") {
            return Err(DepotError::Internal(
                "taxonomy is missing the required 'other' fallback category".to_string(),
            ));
        }
        Ok(Taxonomy {
            categories,
            by_name,
        })
    }

    /// Load a taxonomy from a TOML file.
    pub fn load(path: &Path) -> Result<Taxonomy> {
        let content = std::fs::read_to_string(path)?;
        let file: TaxonomyFile = toml::from_str(&content)
            .map_err(|e| DepotError::Validation(format!("bad taxonomy file: {}", e)))?;
        Taxonomy::from_specs(file.category)
    }

    pub fn get(&self, name: &str) -> Option<&CategorySpec> {
        self.by_name.get(name).map(|&i| &self.categories[i])
    }

    pub fn categories(&self) -> &[CategorySpec] {
        &self.categories
    }

    /// Whether a category name admits thumbnail generation.
    pub fn is_thumbable(&self, name: &str) -> bool {
        self.get(name).map(|c| c.thumbable).unwrap_or(false)
    }

    /// Classify a file from its name, declared MIME, and sniffed MIME.
    ///
    /// Pure and deterministic: the same inputs always yield the same tag.
    ///
    /// 1. The lowercased extension is checked against every tag's
    ///    extension list, in tag order.
    /// 2. Otherwise the effective MIME is the sniffed one when it is
    ///    non-generic, else the declared one, else
    ///    `application/octet-stream`; tags match when any of their MIME
    ///    patterns is a prefix of it.
    /// 3. Otherwise the `other` fallback wins.
    pub fn classify(
        &self,
        filename: &str,
        declared_mime: Option<&str>,
        magic_mime: Option<&str>,
    ) -> Classification<'_> {
        let ext = extension_of(filename);

        // Magic wins over the declared type when it said something specific.
        let (effective_mime, from_magic) = match magic_mime {
            Some(m) if !sniff::is_generic(m) => (m.to_string(), true),
            _ => match declared_mime {
                Some(d) if !d.is_empty() => (d.to_string(), false),
                _ => ("application/octet-stream".to_string(), false),
            },
        };

        if let Some(ref ext) = ext {
            for cat in &self.categories {
                if cat.extensions.iter().any(|e| e == ext) {
                    return Classification {
                        category: cat,
                        matched_by: MatchedBy::Extension,
                        effective_mime,
                    };
                }
            }
        }

        for cat in &self.categories {
            if cat
                .mime_patterns
                .iter()
                .any(|p| effective_mime.starts_with(p.as_str()))
            {
                return Classification {
                    category: cat,
                    matched_by: if from_magic {
                        MatchedBy::Magic
                    } else {
                        MatchedBy::Mime
                    },
                    effective_mime,
                };
            }
        }

        Classification {
            category: self.get("other").expect("fallback checked at load"),
            matched_by: MatchedBy::Default,
            effective_mime,
        }
    }

    /// The default category set.
    pub fn builtin() -> Taxonomy {
        Taxonomy::from_specs(builtin_categories()).expect("builtin taxonomy is valid")
    }
}

/// Lowercased extension of a filename, with the leading dot.
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

fn cat(
    name: &str,
    extensions: &[&str],
    mime_patterns: &[&str],
    thumbable: bool,
    description: &str,
) -> CategorySpec {
    CategorySpec {
        name: name.to_string(),
        extensions: extensions.iter().map(|s| s.to_string()).collect(),
        mime_patterns: mime_patterns.iter().map(|s| s.to_string()).collect(),
        thumbable,
        description: description.to_string(),
    }
}

fn builtin_categories() -> Vec<CategorySpec> {
    vec![
        // Images
        cat(
            "photos",
            &[".jpg", ".jpeg", ".png", ".heic", ".heif", ".raw", ".cr2", ".nef", ".arw"],
            &["image/jpeg", "image/png", "image/heic", "image/x-canon-cr2"],
            true,
            "Photographic images",
        ),
        cat("gifs", &[".gif"], &["image/gif"], true, "Animated GIF images"),
        cat(
            "vector_graphics",
            &[".svg", ".eps", ".ai", ".cdr"],
            &["image/svg+xml", "application/postscript"],
            false,
            "Vector graphics and illustrations",
        ),
        cat("webp", &[".webp"], &["image/webp"], true, "WebP images"),
        cat(
            "icons",
            &[".ico", ".icns"],
            &["image/x-icon", "image/vnd.microsoft.icon"],
            true,
            "Icon files",
        ),
        // Videos
        cat("videos_mp4", &[".mp4", ".m4v"], &["video/mp4"], false, "MP4 video files"),
        cat(
            "videos_mov",
            &[".mov", ".qt"],
            &["video/quicktime"],
            false,
            "QuickTime videos",
        ),
        cat("videos_avi", &[".avi"], &["video/x-msvideo"], false, "AVI video files"),
        cat(
            "videos_mkv",
            &[".mkv"],
            &["video/x-matroska"],
            false,
            "Matroska video files",
        ),
        cat("videos_webm", &[".webm"], &["video/webm"], false, "WebM video files"),
        cat(
            "videos_other",
            &[".wmv", ".flv", ".mpg", ".mpeg", ".3gp", ".ogv"],
            &["video/x-ms-wmv", "video/x-flv", "video/mpeg", "video/"],
            false,
            "Other video formats",
        ),
        // Audio
        cat(
            "audio_music",
            &[".mp3", ".m4a", ".aac", ".flac", ".alac"],
            &["audio/mpeg", "audio/mp4", "audio/aac", "audio/flac"],
            false,
            "Music files",
        ),
        cat(
            "audio_wav",
            &[".wav", ".wave"],
            &["audio/wav", "audio/x-wav"],
            false,
            "WAV audio files",
        ),
        cat("audio_ogg", &[".ogg", ".oga"], &["audio/ogg"], false, "OGG audio files"),
        cat(
            "audio_other",
            &[".wma", ".opus", ".mid", ".midi"],
            &["audio/x-ms-wma", "audio/opus", "audio/midi", "audio/"],
            false,
            "Other audio formats",
        ),
        // Web files
        cat("html", &[".html", ".htm"], &["text/html"], false, "HTML web pages"),
        cat(
            "css",
            &[".css", ".scss", ".sass", ".less"],
            &["text/css"],
            false,
            "CSS stylesheets",
        ),
        cat(
            "javascript",
            &[".js", ".mjs", ".jsx"],
            &["application/javascript", "text/javascript"],
            false,
            "JavaScript files",
        ),
        cat(
            "typescript",
            &[".ts", ".tsx"],
            &["application/typescript"],
            false,
            "TypeScript files",
        ),
        // Programming languages
        cat(
            "python",
            &[".py", ".pyw", ".pyx", ".ipynb"],
            &["text/x-python", "application/x-python-code"],
            false,
            "Python source files",
        ),
        cat(
            "java",
            &[".java", ".class", ".jar"],
            &["text/x-java-source", "application/java-archive"],
            false,
            "Java files",
        ),
        cat(
            "cpp",
            &[".cpp", ".cc", ".cxx", ".c", ".h", ".hpp"],
            &["text/x-c++", "text/x-c"],
            false,
            "C/C++ source files",
        ),
        cat("csharp", &[".cs"], &["text/x-csharp"], false, "C# source files"),
        cat("ruby", &[".rb", ".erb"], &["text/x-ruby"], false, "Ruby files"),
        cat(
            "php",
            &[".php", ".phtml"],
            &["application/x-php", "text/x-php"],
            false,
            "PHP files",
        ),
        cat("go", &[".go"], &["text/x-go"], false, "Go source files"),
        cat("rust", &[".rs"], &["text/x-rust"], false, "Rust source files"),
        cat("swift", &[".swift"], &["text/x-swift"], false, "Swift source files"),
        cat("kotlin", &[".kt", ".kts"], &["text/x-kotlin"], false, "Kotlin source files"),
        // Documents
        cat("pdf", &[".pdf"], &["application/pdf"], false, "PDF documents"),
        cat(
            "word",
            &[".doc", ".docx", ".odt"],
            &[
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ],
            false,
            "Word documents",
        ),
        cat(
            "excel",
            &[".xls", ".xlsx", ".ods"],
            &[
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ],
            false,
            "Excel spreadsheets",
        ),
        cat(
            "powerpoint",
            &[".ppt", ".pptx", ".odp"],
            &[
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ],
            false,
            "PowerPoint presentations",
        ),
        cat("text", &[".txt", ".text", ".log"], &["text/plain"], false, "Plain text files"),
        cat(
            "markdown",
            &[".md", ".markdown", ".mdown"],
            &["text/markdown", "text/x-markdown"],
            false,
            "Markdown files",
        ),
        cat("rtf", &[".rtf"], &["application/rtf", "text/rtf"], false, "Rich Text Format"),
        // Data formats
        cat(
            "json",
            &[".json", ".jsonl", ".geojson"],
            &["application/json"],
            false,
            "JSON data files",
        ),
        cat(
            "xml",
            &[".xml", ".xsd", ".xsl"],
            &["application/xml", "text/xml"],
            false,
            "XML files",
        ),
        cat(
            "yaml",
            &[".yaml", ".yml"],
            &["application/x-yaml", "text/yaml"],
            false,
            "YAML files",
        ),
        cat("csv", &[".csv"], &["text/csv"], false, "CSV data files"),
        cat("sql", &[".sql"], &["application/sql"], false, "SQL files"),
        // Archives
        cat("zip", &[".zip"], &["application/zip"], false, "ZIP archives"),
        cat(
            "rar",
            &[".rar"],
            &["application/x-rar-compressed", "application/vnd.rar"],
            false,
            "RAR archives",
        ),
        cat(
            "tar",
            &[".tar", ".tgz", ".tbz2"],
            &["application/x-tar", "application/gzip"],
            false,
            "TAR archives",
        ),
        cat("7zip", &[".7z"], &["application/x-7z-compressed"], false, "7-Zip archives"),
        cat(
            "archives_other",
            &[".gz", ".bz2", ".xz", ".iso", ".dmg"],
            &["application/x-bzip2", "application/x-xz"],
            false,
            "Other archive formats",
        ),
        // Executables
        cat(
            "windows_exe",
            &[".exe", ".msi", ".dll"],
            &["application/x-msdownload", "application/x-msi"],
            false,
            "Windows executables",
        ),
        cat(
            "mac_apps",
            &[".app", ".pkg"],
            &["application/x-apple-diskimage"],
            false,
            "macOS applications",
        ),
        cat(
            "linux_bin",
            &[".deb", ".rpm", ".appimage"],
            &["application/x-debian-package", "application/x-rpm", "application/x-executable"],
            false,
            "Linux packages",
        ),
        // Fonts
        cat(
            "fonts",
            &[".ttf", ".otf", ".woff", ".woff2", ".eot"],
            &["font/ttf", "font/otf", "font/woff", "font/"],
            false,
            "Font files",
        ),
        // 3D and CAD
        cat(
            "3d_models",
            &[".obj", ".fbx", ".stl", ".blend", ".3ds", ".dae", ".gltf", ".glb"],
            &["model/obj", "model/gltf+json", "model/gltf-binary"],
            false,
            "3D model files",
        ),
        cat(
            "cad",
            &[".dwg", ".dxf", ".step", ".stp", ".iges"],
            &["application/acad", "image/vnd.dxf"],
            false,
            "CAD files",
        ),
        // Ebooks
        cat(
            "ebooks",
            &[".epub", ".mobi", ".azw", ".azw3"],
            &["application/epub+zip"],
            false,
            "E-book files",
        ),
        // Subtitles
        cat(
            "subtitles",
            &[".srt", ".sub", ".vtt", ".ass", ".ssa"],
            &["text/vtt", "application/x-subrip"],
            false,
            "Subtitle files",
        ),
        // Configuration
        cat(
            "config",
            &[".conf", ".cfg", ".ini", ".env", ".properties", ".toml"],
            &[],
            false,
            "Configuration files",
        ),
        // Shell scripts
        cat(
            "shell_scripts",
            &[".sh", ".bash", ".zsh", ".fish", ".bat", ".cmd", ".ps1"],
            &["application/x-sh", "application/x-shellscript"],
            false,
            "Shell scripts",
        ),
        cat("torrents", &[".torrent"], &["application/x-bittorrent"], false, "Torrent files"),
        // Fallback
        cat("other", &[], &[], false, "Uncategorized files"),
    ]
}
