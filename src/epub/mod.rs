//! EPUB 2 assembler. Packs a title, an author, and ordered chapters into an in-memory archive:
//! `mimetype` (stored), `META-INF/container.xml`, `content.opf`, `toc.ncx`, `chapter{N}.html`.

use crate::model::{Book, Chapter};
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MIMETYPE: &[u8] = b"application/epub+zip";
const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";
const LANGUAGE: &str = "en";

/// Errors from packaging. Only the archive and file layers can fail.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Cannot write EPUB: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// A finished EPUB held in memory.
#[derive(Debug, Clone)]
pub struct EpubArchive {
    title: String,
    bytes: Vec<u8>,
}

impl EpubArchive {
    /// `{title}.epub`, with characters that are unsafe in file names replaced.
    pub fn file_name(&self) -> String {
        archive_file_name(&self.title)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the archive to `path`. A failed write leaves no file behind.
    pub fn write_to(&self, path: &Path) -> Result<(), EpubError> {
        crate::output::write_atomically(path, &self.bytes).map_err(|e| EpubError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// File name for a book titled `title`.
pub fn archive_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "book.epub".to_string()
    } else {
        format!("{}.epub", cleaned)
    }
}

/// Lowercase ASCII slug used for the package identifier.
fn slug(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "book".to_string();
    }
    s
}

/// Build the archive. Spine, manifest, and navMap all follow `chapters` order.
pub fn assemble(title: &str, author: &str, chapters: &[Chapter]) -> Result<EpubArchive, EpubError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Must be the first entry, uncompressed.
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    let identifier = format!("urn:storybind:{}", slug(title));
    write_opf(title, author, &identifier, chapters, &mut zip, options_deflate)?;
    write_ncx(title, &identifier, chapters, &mut zip, options_deflate)?;
    write_chapters(chapters, &mut zip, options_deflate)?;

    let bytes = zip.finish()?.into_inner();
    tracing::debug!(
        chapters = chapters.len(),
        bytes = bytes.len(),
        "EPUB assembled"
    );
    Ok(EpubArchive {
        title: title.to_string(),
        bytes,
    })
}

/// Assemble `book` and write it to `path`.
pub fn write_epub(book: &Book, path: &Path) -> Result<(), EpubError> {
    assemble(&book.title, &book.author, &book.chapters)?.write_to(path)
}

fn chapter_href(n: usize) -> String {
    format!("chapter{}.html", n)
}

fn write_opf(
    title: &str,
    author: &str,
    identifier: &str,
    chapters: &[Chapter],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut manifest = String::from(
        r#"    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
"#,
    );
    let mut spine = String::new();
    for (i, _) in chapters.iter().enumerate() {
        let n = i + 1;
        manifest.push_str(&format!(
            "    <item id=\"chapter{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            n,
            chapter_href(n)
        ));
        spine.push_str(&format!("    <itemref idref=\"chapter{}\"/>\n", n));
    }

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:creator opf:role="aut">{creator}</dc:creator>
    <dc:language>{language}</dc:language>
    <dc:identifier id="BookId">{id}</dc:identifier>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        title = xml_escape(title),
        creator = xml_escape(author),
        language = LANGUAGE,
        id = xml_escape(identifier),
        manifest = manifest,
        spine = spine,
    );
    zip.start_file("content.opf", options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_ncx(
    title: &str,
    identifier: &str,
    chapters: &[Chapter],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, ch) in chapters.iter().enumerate() {
        let n = i + 1;
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{href}"/>
    </navPoint>
"#,
            n = n,
            label = xml_escape(&ch.title),
            href = chapter_href(n)
        ));
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        xml_escape(identifier),
        xml_escape(title),
        nav_points
    );
    zip.start_file("toc.ncx", options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

/// Chapter content goes in verbatim except `&nbsp;`, which becomes a plain space.
fn chapter_document(ch: &Chapter) -> String {
    let title = xml_escape(&ch.title);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>{title}</title>
</head>
<body>
<h1>{title}</h1>
{content}
</body>
</html>
"#,
        title = title,
        content = ch.content.replace("&nbsp;", " ")
    )
}

fn write_chapters(
    chapters: &[Chapter],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    for (i, ch) in chapters.iter().enumerate() {
        zip.start_file(chapter_href(i + 1), options)?;
        zip.write_all(chapter_document(ch).as_bytes())?;
    }
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::read::ZipArchive;

    fn chapter(title: &str, content: &str) -> Chapter {
        Chapter {
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    fn open(archive: &EpubArchive) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(archive.as_bytes().to_vec())).unwrap()
    }

    fn read_entry(zip: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut s = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn single_chapter_book() -> Result<(), EpubError> {
        let archive = assemble("T", "A", &[chapter("C1", "<p>x</p>")])?;
        let mut zip = open(&archive);

        let opf = read_entry(&mut zip, "content.opf");
        assert_eq!(opf.matches("<itemref ").count(), 1);
        assert!(opf.contains(r#"<itemref idref="chapter1"/>"#));
        assert!(opf.contains(
            r#"<item id="chapter1" href="chapter1.html" media-type="application/xhtml+xml"/>"#
        ));
        assert!(opf.contains("<dc:title>T</dc:title>"));
        assert!(opf.contains(">A</dc:creator>"));
        assert!(opf.contains("<dc:language>en</dc:language>"));
        assert!(opf.contains(r#"version="2.0""#));

        let ncx = read_entry(&mut zip, "toc.ncx");
        assert_eq!(ncx.matches("<navPoint ").count(), 1);
        assert!(ncx.contains(r#"playOrder="1""#));
        assert!(ncx.contains(r#"<content src="chapter1.html"/>"#));

        let html = read_entry(&mut zip, "chapter1.html");
        let body = &html[html.find("<body>").unwrap()..];
        let heading = body.find("<h1>C1</h1>").unwrap();
        let content = body.find("<p>x</p>").unwrap();
        assert!(heading < content);
        assert!(html.contains("<title>C1</title>"));
        assert!(html.contains(r#"xmlns="http://www.w3.org/1999/xhtml""#));
        Ok(())
    }

    #[test]
    fn mimetype_first_and_stored() -> Result<(), EpubError> {
        let archive = assemble("T", "A", &[chapter("C1", "<p>x</p>")])?;
        let mut zip = open(&archive);
        let mut first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content).unwrap();
        assert_eq!(content, "application/epub+zip");
        // Name sits right after the first 30-byte local header.
        assert_eq!(&archive.as_bytes()[30..38], b"mimetype");
        Ok(())
    }

    #[test]
    fn entry_count_is_fixed_entries_plus_chapters() -> Result<(), EpubError> {
        for n in [1usize, 3, 7] {
            let chapters: Vec<Chapter> = (1..=n)
                .map(|i| chapter(&format!("Ch {}", i), "<p>.</p>"))
                .collect();
            let archive = assemble("T", "A", &chapters)?;
            let zip = open(&archive);
            assert_eq!(zip.len(), n + 4);
            let names: Vec<&str> = zip.file_names().collect();
            for required in ["mimetype", "META-INF/container.xml", "content.opf", "toc.ncx"] {
                assert!(names.contains(&required), "missing {}", required);
            }
        }
        Ok(())
    }

    #[test]
    fn spine_and_nav_follow_chapter_order() -> Result<(), EpubError> {
        let chapters = vec![
            chapter("Beginning", "<p>1</p>"),
            chapter("Middle", "<p>2</p>"),
            chapter("End", "<p>3</p>"),
        ];
        let archive = assemble("T", "A", &chapters)?;
        let mut zip = open(&archive);

        let opf = read_entry(&mut zip, "content.opf");
        let spine_positions: Vec<usize> = (1..=3)
            .map(|n| opf.find(&format!("<itemref idref=\"chapter{}\"/>", n)).unwrap())
            .collect();
        assert!(spine_positions.windows(2).all(|w| w[0] < w[1]));

        let ncx = read_entry(&mut zip, "toc.ncx");
        let labels: Vec<usize> = ["Beginning", "Middle", "End"]
            .iter()
            .map(|t| ncx.find(&format!("<text>{}</text>", t)).unwrap())
            .collect();
        assert!(labels.windows(2).all(|w| w[0] < w[1]));
        assert!(ncx.contains(r#"<navPoint id="navpoint-3" playOrder="3">"#));

        assert!(read_entry(&mut zip, "chapter2.html").contains("<h1>Middle</h1>"));
        Ok(())
    }

    #[test]
    fn container_points_at_package() -> Result<(), EpubError> {
        let archive = assemble("T", "A", &[chapter("C1", "")])?;
        let mut zip = open(&archive);
        let container = read_entry(&mut zip, "META-INF/container.xml");
        assert!(container.contains(r#"full-path="content.opf""#));
        Ok(())
    }

    #[test]
    fn nbsp_is_the_only_content_transform() -> Result<(), EpubError> {
        let content = "<p>a&nbsp;b&nbsp;&nbsp;c</p><hr class=\"page-break\"/><p>d &amp; e<br></p>";
        let archive = assemble("T", "A", &[chapter("C1", content)])?;
        let mut zip = open(&archive);
        let html = read_entry(&mut zip, "chapter1.html");
        assert!(html.contains("<p>a b  c</p><hr class=\"page-break\"/><p>d &amp; e<br></p>"));
        assert!(!html.contains("&nbsp;"));
        Ok(())
    }

    #[test]
    fn metadata_is_escaped() -> Result<(), EpubError> {
        let archive = assemble("Love & <War>", "O'Hara", &[chapter("Part \"1\"", "<p/>")])?;
        let mut zip = open(&archive);
        let opf = read_entry(&mut zip, "content.opf");
        assert!(opf.contains("<dc:title>Love &amp; &lt;War&gt;</dc:title>"));
        assert!(opf.contains("O&apos;Hara"));
        let ncx = read_entry(&mut zip, "toc.ncx");
        assert!(ncx.contains("<text>Part &quot;1&quot;</text>"));
        Ok(())
    }

    #[test]
    fn file_name_from_title() {
        assert_eq!(archive_file_name("Harbor Lights"), "Harbor Lights.epub");
        assert_eq!(archive_file_name("A/B: C?"), "A_B_ C_.epub");
        assert_eq!(archive_file_name("   "), "book.epub");
        let archive = EpubArchive {
            title: "Quiet Hours".to_string(),
            bytes: Vec::new(),
        };
        assert_eq!(archive.file_name(), "Quiet Hours.epub");
    }

    #[test]
    fn slug_collapses_and_trims() {
        assert_eq!(slug("  --  a  --  b  --  "), "a-b");
        assert_eq!(slug(""), "book");
        assert_eq!(slug("Mother of Learning"), "mother-of-learning");
    }

    #[test]
    fn write_epub_creates_file() -> Result<(), EpubError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.epub");
        let book = Book {
            title: "T".to_string(),
            author: "A".to_string(),
            chapters: vec![chapter("C1", "<p>x</p>")],
            source_url: None,
        };
        write_epub(&book, &path)?;
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));
        Ok(())
    }

    #[test]
    fn write_to_replaces_existing_file_without_leftovers() -> Result<(), EpubError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("T.epub");
        std::fs::write(&path, b"stale").unwrap();
        let archive = assemble("T", "A", &[chapter("C1", "<p>x</p>")])?;
        archive.write_to(&path)?;
        assert_eq!(std::fs::read(&path).unwrap(), archive.as_bytes());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        Ok(())
    }

    #[test]
    fn write_to_missing_dir_is_io_error() {
        let archive = EpubArchive {
            title: "T".to_string(),
            bytes: vec![1, 2, 3],
        };
        let result = archive.write_to(Path::new("/nonexistent_dir_storybind_xyz/out.epub"));
        assert!(matches!(result, Err(EpubError::Io { .. })));
    }
}
