//! EPUB chapter extraction.
//!
//! Opens the archive, follows `META-INF/container.xml` to the package
//! document, and walks the spine in reading order. Every XHTML content
//! document becomes one [`Chapter`] holding its visible text and a title.
//! Documents missing from the spine follow the spine ones.

use crate::error::SourceError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scraper::{ElementRef, Html, Selector};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media types treated as content documents.
const DOCUMENT_MEDIA_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("Invalid BODY_SELECTOR"));

static HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("Invalid HEADING_SELECTOR"));

/// One content document of the book.
#[derive(Debug, Clone)]
pub struct Chapter {
    /// Position in reading order (0-based).
    pub index: usize,
    /// First heading of the document, or `Chapter N`.
    pub title: String,
    /// Visible text, one block per line.
    pub text: String,
}

/// An opened EPUB book.
#[derive(Debug, Clone)]
pub struct Book {
    title: Option<String>,
    chapters: Vec<Chapter>,
}

/// Manifest entry of the package document.
#[derive(Debug)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

impl ManifestItem {
    fn is_content_document(&self) -> bool {
        DOCUMENT_MEDIA_TYPES.contains(&self.media_type.as_str())
            && !self.properties.split_whitespace().any(|p| p == "nav")
    }
}

/// The parts of the package document we use.
#[derive(Debug, Default)]
struct Package {
    title: Option<String>,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
}

impl Package {
    /// Content documents in spine order, followed by manifest documents
    /// the spine does not reference, in manifest order.
    fn documents(&self) -> Vec<&ManifestItem> {
        let mut documents: Vec<&ManifestItem> = Vec::new();
        for idref in &self.spine {
            match self.manifest.iter().find(|item| &item.id == idref) {
                Some(item) if !documents.iter().any(|d| d.id == item.id) => documents.push(item),
                Some(_) => {}
                None => debug!(idref = %idref, "Spine reference without manifest entry"),
            }
        }

        documents.retain(|item| item.is_content_document());

        let unlisted: Vec<&ManifestItem> = self
            .manifest
            .iter()
            .filter(|item| item.is_content_document() && !self.spine.contains(&item.id))
            .collect();
        if !unlisted.is_empty() {
            debug!(count = unlisted.len(), "Content documents outside the spine");
        }
        documents.extend(unlisted);
        documents
    }
}

impl Book {
    /// Open an EPUB file and extract every chapter.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read an EPUB from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, SourceError> {
        let mut archive = ZipArchive::new(reader)?;

        let container = read_entry_string(&mut archive, CONTAINER_PATH)?;
        let package_path = parse_container(&container)?;
        let package = parse_package(&read_entry_string(&mut archive, &package_path)?)?;
        let base_dir = package_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("");

        let mut chapters = Vec::new();
        for item in package.documents() {
            let entry = resolve_href(base_dir, &item.href);
            let markup = read_entry_string(&mut archive, &entry)?;
            chapters.push(extract_chapter(chapters.len(), &markup));
        }

        debug!(chapters = chapters.len(), title = ?package.title, "Opened EPUB");

        Ok(Self {
            title: package.title,
            chapters,
        })
    }

    /// Book title from the package metadata.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

fn read_entry_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, SourceError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => SourceError::MissingEntry(name.to_string()),
        other => SourceError::Archive(other),
    })?;

    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| SourceError::Archive(ZipError::Io(e)))?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn xml_error(e: quick_xml::Error) -> SourceError {
    SourceError::Package(e.to_string())
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>, SourceError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SourceError::Package(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// Returns the archive path of the package document.
fn parse_container(xml: &str) -> Result<String, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path")? {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(SourceError::Package(
        "container.xml has no rootfile".to_string(),
    ))
}

fn parse_package(xml: &str) -> Result<Package, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut package = Package::default();
    let mut in_title = false;
    let mut saw_package = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if e.local_name().as_ref() == b"title" => {
                in_title = package.title.is_none();
            }
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"package" => saw_package = true,
                b"item" => {
                    let (Some(id), Some(href)) = (attribute(&e, b"id")?, attribute(&e, b"href")?)
                    else {
                        continue;
                    };
                    package.manifest.push(ManifestItem {
                        id,
                        href,
                        media_type: attribute(&e, b"media-type")?.unwrap_or_default(),
                        properties: attribute(&e, b"properties")?.unwrap_or_default(),
                    });
                }
                b"itemref" => {
                    if let Some(idref) = attribute(&e, b"idref")? {
                        package.spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::Text(t) if in_title => {
                let title = t.unescape().map_err(xml_error)?.trim().to_string();
                if !title.is_empty() {
                    package.title = Some(title);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"title" => in_title = false,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_package {
        return Err(SourceError::Package(
            "package document has no <package> root".to_string(),
        ));
    }

    Ok(package)
}

/// Resolve a manifest href against the package directory.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_decode(href);

    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Build a chapter from one XHTML document.
fn extract_chapter(index: usize, markup: &str) -> Chapter {
    let document = Html::parse_document(markup);
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());

    let title = document
        .select(&HEADING_SELECTOR)
        .next()
        .map(|heading| collapse_whitespace(&heading.text().collect::<String>()))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("Chapter {}", index + 1));

    Chapter {
        index,
        title,
        text: visible_text(root),
    }
}

/// Text nodes under `root`, trimmed, one per line; script and style skipped.
fn visible_text(root: ElementRef) -> String {
    let mut blocks: Vec<&str> = Vec::new();

    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            blocks.push(trimmed);
        }
    }

    blocks.join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_epub, write_zip};
    use tempfile::TempDir;

    #[test]
    fn test_open_fixture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(
            &path,
            Some("The Hobbit"),
            &[
                "<h1>Chapter One</h1><p>In a hole in the ground</p><p>there lived a hobbit.</p>",
                "<p>No heading here.</p>",
            ],
        );

        let book = Book::open(&path).unwrap();
        assert_eq!(book.title(), Some("The Hobbit"));
        assert_eq!(book.len(), 2);

        let first = &book.chapters()[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.title, "Chapter One");
        assert_eq!(
            first.text,
            "Chapter One\nIn a hole in the ground\nthere lived a hobbit."
        );

        let second = &book.chapters()[1];
        assert_eq!(second.title, "Chapter 2");
        assert_eq!(second.text, "No heading here.");
    }

    #[test]
    fn test_heading_levels_and_whitespace() {
        let chapter = extract_chapter(
            0,
            "<html><body><p>intro</p><h3>  The\n   Road </h3><h1>Later</h1></body></html>",
        );
        assert_eq!(chapter.title, "The Road");
    }

    #[test]
    fn test_script_and_style_are_skipped() {
        let chapter = extract_chapter(
            4,
            "<html><head><title>ignored</title><style>p { color: red }</style></head>\
             <body><script>var x = 1;</script><p>Visible</p></body></html>",
        );
        assert_eq!(chapter.text, "Visible");
        assert_eq!(chapter.title, "Chapter 5");
    }

    #[test]
    fn test_empty_document() {
        let chapter = extract_chapter(0, "<html><body>   </body></html>");
        assert!(chapter.text.is_empty());
    }

    #[test]
    fn test_spine_order_and_nav_exclusion() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ordered.epub");
        let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Order &amp; Chaos</dc:title>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="a" href="text/a.xhtml" media-type="application/xhtml+xml"/>
    <item id="b" href="text/my%20b.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine>
    <itemref idref="nav"/>
    <itemref idref="b"/>
    <itemref idref="css"/>
    <itemref idref="a"/>
  </spine>
</package>"#;
        write_zip(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                (
                    "META-INF/container.xml",
                    r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OPS/book.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
                ),
                ("OPS/book.opf", opf),
                ("OPS/nav.xhtml", "<html><body><nav>toc</nav></body></html>"),
                ("OPS/text/a.xhtml", "<html><body><h2>A</h2></body></html>"),
                ("OPS/text/my b.xhtml", "<html><body><h2>B</h2></body></html>"),
                ("OPS/style.css", "p {}"),
            ],
        );

        let book = Book::open(&path).unwrap();
        assert_eq!(book.title(), Some("Order & Chaos"));
        let titles: Vec<&str> = book.chapters().iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
        assert_eq!(book.chapters()[1].index, 1);
    }

    #[test]
    fn test_documents_outside_spine_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appendix.epub");
        let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <manifest>
    <item id="notes" href="notes.xhtml" media-type="application/xhtml+xml"/>
    <item id="main" href="main.xhtml" media-type="application/xhtml+xml"/>
    <item id="extra" href="extra.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="main"/>
    <itemref idref="main"/>
  </spine>
</package>"#;
        write_zip(
            &path,
            &[
                ("mimetype", "application/epub+zip"),
                (
                    "META-INF/container.xml",
                    r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="book.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
                ),
                ("book.opf", opf),
                ("notes.xhtml", "<html><body><h1>Notes</h1></body></html>"),
                ("main.xhtml", "<html><body><h1>Main</h1></body></html>"),
                ("extra.xhtml", "<html><body><h1>Extra</h1></body></html>"),
            ],
        );

        let book = Book::open(&path).unwrap();
        let titles: Vec<&str> = book.chapters().iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Main", "Notes", "Extra"]);
    }

    #[test]
    fn test_missing_container_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.epub");
        write_zip(&path, &[("mimetype", "application/epub+zip")]);

        let err = Book::open(&path).unwrap_err();
        assert!(matches!(err, SourceError::MissingEntry(ref name) if name == CONTAINER_PATH));
    }

    #[test]
    fn test_not_an_archive_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.epub");
        std::fs::write(&path, "definitely not a zip").unwrap();

        assert!(matches!(
            Book::open(&path).unwrap_err(),
            SourceError::Archive(_)
        ));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Book::open(Path::new("/nonexistent/book.epub")).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href("OEBPS", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("", "ch1.xhtml#part"), "ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/pkg", "../text/./a.xhtml"), "OEBPS/text/a.xhtml");
        assert_eq!(resolve_href("OEBPS", "my%20file.xhtml"), "OEBPS/my file.xhtml");
    }

    #[test]
    fn test_percent_decode_edge_cases() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("a%2"), "a%2");
        assert_eq!(percent_decode("%zzb"), "%zzb");
        assert_eq!(percent_decode("%C3%A9"), "é");
    }
}
