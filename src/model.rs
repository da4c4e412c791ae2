//! Data model shared by the scraper and the EPUB writer.

use serde::{Deserialize, Serialize};

/// One book: a single story or a whole series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    /// Chapters in reading order; this order becomes the EPUB spine.
    pub chapters: Vec<Chapter>,
    /// URL the run started from.
    #[serde(rename = "sourceUrl", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// One logical chapter. `content` is an HTML fragment, possibly stitched from several pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub content: String,
}

/// One chapter link read from a series page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEntry {
    /// Absolute URL.
    #[serde(rename = "chapterUrl")]
    pub chapter_url: String,
    #[serde(rename = "chapterTitle")]
    pub chapter_title: String,
}

/// Title and author, from the series page or the story's first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn book_json_shape() -> Result<(), Box<dyn Error>> {
        let book = Book {
            title: "Night Shift".to_string(),
            author: "quietpen".to_string(),
            chapters: vec![Chapter {
                title: "Night Shift Ch. 01".to_string(),
                content: "<p>It was late.</p>".to_string(),
            }],
            source_url: None,
        };
        let value: serde_json::Value = serde_json::to_value(&book)?;
        assert_eq!(value["title"].as_str(), Some("Night Shift"));
        assert_eq!(value["author"].as_str(), Some("quietpen"));
        assert!(value.get("sourceUrl").is_none());
        assert_eq!(
            value["chapters"][0]["content"].as_str(),
            Some("<p>It was late.</p>")
        );

        let back: Book = serde_json::from_value(value)?;
        assert_eq!(back, book);
        Ok(())
    }

    #[test]
    fn series_entry_uses_camel_case_keys() -> Result<(), Box<dyn Error>> {
        let entry = SeriesEntry {
            chapter_url: "https://www.literotica.com/s/ch-01".to_string(),
            chapter_title: "Ch. 01".to_string(),
        };
        let json = serde_json::to_string(&entry)?;
        assert!(json.contains("\"chapterUrl\""));
        assert!(json.contains("\"chapterTitle\""));
        Ok(())
    }
}
