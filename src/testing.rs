//! Test fixtures shared by the module tests.

use crate::provider::{Completion, Provider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Write a zip archive with the given entries, in order.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);

    for (name, content) in entries {
        let method = if *name == "mimetype" {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        zip.start_file(*name, FileOptions::default().compression_method(method))
            .unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }

    zip.finish().unwrap();
}

/// Read one entry of a zip archive as text.
pub fn read_zip_entry(path: &Path, name: &str) -> String {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

/// Write a minimal EPUB 2 book with one XHTML document per body.
pub fn write_epub(path: &Path, title: Option<&str>, bodies: &[&str]) {
    let metadata = match title {
        Some(title) => format!("<dc:title>{}</dc:title>", title),
        None => String::new(),
    };

    let mut manifest = String::new();
    let mut spine = String::new();
    let mut documents = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        manifest.push_str(&format!(
            r#"<item id="ch{i}" href="text/ch{i}.xhtml" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="ch{i}"/>"#));
        documents.push((
            format!("OEBPS/text/ch{i}.xhtml"),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <html xmlns=\"http://www.w3.org/1999/xhtml\">\
                 <head><title>Document {i}</title></head>\
                 <body>{body}</body></html>"
            ),
        ));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{metadata}</metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    {manifest}
  </manifest>
  <spine toc="ncx">{spine}</spine>
</package>"#
    );

    let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    let mut entries: Vec<(&str, &str)> = vec![
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", container),
        ("OEBPS/content.opf", opf.as_str()),
    ];
    for (name, content) in &documents {
        entries.push((name.as_str(), content.as_str()));
    }

    write_zip(path, &entries);
}

/// A provider that replays scripted completions, then echoes the prompt.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Completion>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the prompt it was given.
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate(&self, prompt: &str) -> Completion {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Completion::Success(prompt.to_string()))
    }
}
