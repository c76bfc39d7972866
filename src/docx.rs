//! Minimal WordprocessingML (DOCX) writer.
//!
//! Only what the translated book needs: a title, headings, plain
//! paragraphs with line breaks, and page breaks.

use crate::error::PersistenceError;
use chrono::Utc;
use quick_xml::escape::escape;
use std::io::{Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::FileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:docDefaults><w:rPrDefault><w:rPr><w:sz w:val="24"/></w:rPr></w:rPrDefault></w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="160"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:jc w:val="center"/><w:spacing w:after="480"/></w:pPr><w:rPr><w:b/><w:sz w:val="56"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="240"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:sz w:val="32"/></w:rPr></w:style>
</w:styles>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

/// Accumulates paragraphs and writes them as a `.docx` package.
#[derive(Debug, Clone, Default)]
pub struct DocxBuilder {
    title: String,
    body: String,
}

impl DocxBuilder {
    /// Start a document whose first paragraph is `title` in the Title style.
    pub fn new(title: &str) -> Self {
        let mut builder = Self {
            title: title.to_string(),
            body: String::new(),
        };
        builder.styled_paragraph(Some("Title"), title);
        builder
    }

    pub fn heading(&mut self, text: &str) -> &mut Self {
        self.styled_paragraph(Some("Heading1"), text)
    }

    /// A body paragraph; newlines become line breaks.
    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        self.styled_paragraph(None, text)
    }

    pub fn page_break(&mut self) -> &mut Self {
        self.body
            .push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        self
    }

    /// The `word/document.xml` part.
    pub fn document_xml(&self) -> String {
        format!("{}{}{}", DOCUMENT_OPEN, self.body, DOCUMENT_CLOSE)
    }

    /// Write the package to `writer`.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W, ZipError> {
        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default();

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("word/document.xml", self.document_xml()),
            ("word/styles.xml", STYLES.to_string()),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
            ("docProps/core.xml", self.core_xml()),
        ];
        for (name, content) in parts {
            zip.start_file(name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()
    }

    /// Write the package to `path`, replacing any existing file whole.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

        let file = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
        let file = self.write_to(file)?;
        file.as_file()
            .sync_all()
            .map_err(|e| PersistenceError::io(path, e))?;
        file.persist(path)
            .map_err(|e| PersistenceError::io(path, e.error))?;

        Ok(())
    }

    fn styled_paragraph(&mut self, style: Option<&str>, text: &str) -> &mut Self {
        self.body.push_str("<w:p>");
        if let Some(style) = style {
            self.body
                .push_str(&format!(r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#, style));
        }

        self.body.push_str("<w:r>");
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                self.body.push_str("<w:br/>");
            }
            self.body.push_str(r#"<w:t xml:space="preserve">"#);
            self.body.push_str(&escape(&xml_safe(line)));
            self.body.push_str("</w:t>");
        }
        self.body.push_str("</w:r></w:p>");
        self
    }

    fn core_xml(&self) -> String {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:title>{}</dc:title>
<dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{}</dcterms:modified>
</cp:coreProperties>"#,
            escape(&xml_safe(&self.title)),
            now,
            now
        )
    }
}

/// Drop characters XML 1.0 cannot carry.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\t' || c >= ' ')
        .filter(|&c| c != '\u{FFFE}' && c != '\u{FFFF}')
        .collect()
}
