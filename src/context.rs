//! Prompt assembly from command-line arguments.
//!
//! Every argument becomes one content part, in argument order:
//! - an existing image file is attached as an image;
//! - a PDF file has its page text extracted and wrapped in the document
//!   template;
//! - any other existing file is read and wrapped in the document template;
//! - an `http`/`https` URL is resolved through the page cache, then fetched
//!   live, and wrapped in the document template;
//! - anything else is literal text.

use crate::client::error_body;
use crate::error::Error;
use crate::types::{ContentPart, ImageFormat, Message};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Wrap context content so the model can tell where it came from.
pub fn render_document(source: &str, content: &str) -> String {
    format!(
        "\n<document>\n<source>\n{source}\n</source>\n<document_content>\n{content}\n</document_content>\n</document>\n"
    )
}

/// Parse an argument as an absolute web URL. Other schemes are not URLs here.
pub fn parse_web_url(arg: &str) -> Option<Url> {
    let url = Url::parse(arg).ok()?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Some(url),
        _ => None,
    }
}

/// Read-through lookup of previously scraped pages, keyed by URL.
pub trait PageCache: Send + Sync {
    /// Cached page text for `url`, or `None` on a miss.
    fn lookup(&self, url: &str) -> Result<Option<String>, Error>;
}

/// Page cache backed by the notes database of the `scrappy` scraper.
#[derive(Debug, Clone)]
pub struct NotesCache {
    path: PathBuf,
}

impl NotesCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.scrappy/scrappy_notes.db`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".scrappy")
                .join("scrappy_notes.db"),
        )
    }
}

impl PageCache for NotesCache {
    fn lookup(&self, url: &str) -> Result<Option<String>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let content: Option<Option<String>> = conn
            .query_row("SELECT content FROM notes WHERE url = ?1", [url], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(content.flatten().filter(|c| !c.is_empty()))
    }
}

/// A cache that never hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl PageCache for NoCache {
    fn lookup(&self, _url: &str) -> Result<Option<String>, Error> {
        Ok(None)
    }
}

/// Turns CLI arguments into a single user message.
pub struct ContextBuilder {
    http: reqwest::Client,
    cache: Box<dyn PageCache>,
}

impl ContextBuilder {
    pub fn new(http: reqwest::Client, cache: Box<dyn PageCache>) -> Self {
        Self { http, cache }
    }

    /// Builder using the default notes database location.
    pub fn with_default_cache(http: reqwest::Client) -> Self {
        let cache: Box<dyn PageCache> = match NotesCache::default_path() {
            Some(path) => Box::new(NotesCache::new(path)),
            None => Box::new(NoCache),
        };
        Self::new(http, cache)
    }

    /// Build the message from every argument in order.
    pub async fn build_message<S: AsRef<str>>(&self, args: &[S]) -> Result<Message, Error> {
        let mut message = Message::new_user();
        for arg in args {
            message.push(self.part_for(arg.as_ref()).await?);
        }
        if message.is_empty() {
            return Err(Error::config("no messages provided"));
        }
        Ok(message)
    }

    async fn part_for(&self, arg: &str) -> Result<ContentPart, Error> {
        let path = Path::new(arg);
        if path.is_file() {
            return file_part(path);
        }
        if let Some(url) = parse_web_url(arg) {
            let content = self.page_text(&url).await?;
            return Ok(ContentPart::text(render_document(arg, &content)));
        }
        Ok(ContentPart::text(arg))
    }

    async fn page_text(&self, url: &Url) -> Result<String, Error> {
        match self.cache.lookup(url.as_str()) {
            Ok(Some(content)) => {
                debug!(url = %url, "page cache hit");
                return Ok(content);
            }
            Ok(None) => debug!(url = %url, "page cache miss"),
            Err(e) => warn!(url = %url, error = %e, "page cache lookup failed"),
        }

        info!(url = %url, "scraping the web page");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::api(status.as_u16(), error_body(response).await));
        }
        let html = response.text().await?;
        Ok(extract_readable(&html, url).unwrap_or(html))
    }
}

fn file_part(path: &Path) -> Result<ContentPart, Error> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if let Some(format) = ImageFormat::from_extension(&ext) {
        let data = std::fs::read(path)?;
        return Ok(ContentPart::image(data, format));
    }

    let content = if ext == "pdf" {
        pdf_text(path)?
    } else {
        // Invalid UTF-8 is replaced rather than failing the run
        String::from_utf8_lossy(&std::fs::read(path)?).into_owned()
    };
    Ok(ContentPart::text(render_document(
        &path.to_string_lossy(),
        &content,
    )))
}

/// Text of every page in order, one page per line group.
fn pdf_text(path: &Path) -> Result<String, Error> {
    let doc = lopdf::Document::load(path)?;
    let pages = doc.get_pages();
    debug!(path = %path.display(), pages = pages.len(), "extracting PDF text");

    let mut content = String::new();
    for page in pages.keys() {
        content.push_str(&doc.extract_text(&[*page])?);
        content.push('\n');
    }
    Ok(content)
}

fn extract_readable(html: &str, url: &Url) -> Option<String> {
    let mut cursor = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut cursor, url) {
        Ok(product) => {
            let text = product.text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Err(e) => {
            debug!("readability extraction failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FixedCache(&'static str);

    impl PageCache for FixedCache {
        fn lookup(&self, _url: &str) -> Result<Option<String>, Error> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn builder(cache: Box<dyn PageCache>) -> ContextBuilder {
        ContextBuilder::new(reqwest::Client::new(), cache)
    }

    #[test]
    fn test_render_document() {
        let doc = render_document("notes.txt", "hello");
        assert!(doc.contains("<source>\nnotes.txt\n</source>"));
        assert!(doc.contains("<document_content>\nhello\n</document_content>"));
        assert!(doc.trim_end().ends_with("</document>"));
    }

    #[test]
    fn test_parse_web_url() {
        assert!(parse_web_url("https://example.com/page").is_some());
        assert!(parse_web_url("http://localhost:8080/x").is_some());
        assert!(parse_web_url("ftp://example.com").is_none());
        assert!(parse_web_url("how do I list files").is_none());
        assert!(parse_web_url("mailto:someone@example.com").is_none());
    }

    #[tokio::test]
    async fn test_plain_text_and_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let text_path = dir.path().join("notes.md");
        std::fs::File::create(&text_path)
            .unwrap()
            .write_all(b"# Notes")
            .unwrap();
        let image_path = dir.path().join("shot.PNG");
        std::fs::write(&image_path, b"\x89PNG").unwrap();

        let args = vec![
            "explain".to_string(),
            text_path.to_string_lossy().into_owned(),
            image_path.to_string_lossy().into_owned(),
        ];
        let message = builder(Box::new(NoCache)).build_message(&args).await.unwrap();

        assert_eq!(message.parts.len(), 3);
        assert_eq!(message.parts[0], ContentPart::text("explain"));
        match &message.parts[1] {
            ContentPart::Text(text) => {
                assert!(text.contains("<document_content>\n# Notes\n"));
                assert!(text.contains("notes.md"));
            }
            other => panic!("expected document text, got {other:?}"),
        }
        match &message.parts[2] {
            ContentPart::Image { data, format } => {
                assert_eq!(*format, ImageFormat::Png);
                assert_eq!(&data[..], b"\x89PNG");
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    fn write_pdf(path: &Path, pages: &[&str]) {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = i64::try_from(kids.len()).unwrap();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[tokio::test]
    async fn test_pdf_pages_extracted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        write_pdf(&pdf, &["First page", "Second page"]);

        let message = builder(Box::new(NoCache))
            .build_message(&[pdf.to_string_lossy().into_owned()])
            .await
            .unwrap();

        let text = message.parts[0].as_text().unwrap();
        assert!(text.contains("paper.pdf"));
        let first = text.find("First page").unwrap();
        let second = text.find("Second page").unwrap();
        assert!(first < second);
        assert!(text.contains("<document_content>"));
    }

    #[tokio::test]
    async fn test_unreadable_pdf_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, b"not a pdf").unwrap();

        let err = builder(Box::new(NoCache))
            .build_message(&[pdf.to_string_lossy().into_owned()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pdf(_)));
    }

    #[tokio::test]
    async fn test_non_utf8_file_sent_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, b"caf\xe9 au lait").unwrap();

        let message = builder(Box::new(NoCache))
            .build_message(&[path.to_string_lossy().into_owned()])
            .await
            .unwrap();

        let text = message.parts[0].as_text().unwrap();
        assert!(text.contains("caf\u{fffd} au lait"));
    }

    #[tokio::test]
    async fn test_url_served_from_cache() {
        let message = builder(Box::new(FixedCache("cached page")))
            .build_message(&["https://example.com/article"])
            .await
            .unwrap();

        let text = message.parts[0].as_text().unwrap();
        assert!(text.contains("<source>\nhttps://example.com/article\n</source>"));
        assert!(text.contains("cached page"));
    }

    #[tokio::test]
    async fn test_no_arguments() {
        let args: [&str; 0] = [];
        let err = builder(Box::new(NoCache))
            .build_message(&args)
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_notes_cache_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("scrappy_notes.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (url TEXT PRIMARY KEY, content TEXT);
             INSERT INTO notes (url, content) VALUES ('https://a.example/', 'page a');
             INSERT INTO notes (url, content) VALUES ('https://b.example/', '');",
        )
        .unwrap();
        drop(conn);

        let cache = NotesCache::new(&db);
        assert_eq!(
            cache.lookup("https://a.example/").unwrap().as_deref(),
            Some("page a")
        );
        assert_eq!(cache.lookup("https://b.example/").unwrap(), None);
        assert_eq!(cache.lookup("https://c.example/").unwrap(), None);
    }

    #[test]
    fn test_notes_cache_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let cache = NotesCache::new(dir.path().join("absent.db"));
        assert_eq!(cache.lookup("https://a.example/").unwrap(), None);
    }
}
