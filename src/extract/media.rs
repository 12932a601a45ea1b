use crate::extract::{collapse_whitespace, document_extension};
use crate::extract::links::resolve_link;
use crate::model::{Audio, Document, Image, MediaPayload, Video};
use scraper::{Html, Selector};
use url::Url;

/// Hosts whose iframes are recorded as embedded videos
const VIDEO_HOSTS: &[(&str, &str)] = &[("youtube", "youtube"), ("youtu.be", "youtube"), ("vimeo", "vimeo")];

pub fn extract_media(document: &Html, base_url: &Url) -> MediaPayload {
    MediaPayload {
        images: extract_images(document, base_url),
        videos: extract_videos(document, base_url),
        audio: extract_audio(document, base_url),
        documents: extract_documents(document, base_url),
    }
}

fn attr_text(element: &scraper::ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<Image> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|img| {
            let url = resolve_link(img.value().attr("src")?, base_url)?;
            Some(Image {
                url,
                alt: attr_text(&img, "alt"),
                title: attr_text(&img, "title"),
            })
        })
        .collect()
}

fn extract_videos(document: &Html, base_url: &Url) -> Vec<Video> {
    let mut videos = Vec::new();

    if let Ok(selector) = Selector::parse("video[src], video source[src]") {
        for element in document.select(&selector) {
            if let Some(url) = element
                .value()
                .attr("src")
                .and_then(|src| resolve_link(src, base_url))
            {
                videos.push(Video {
                    url,
                    kind: "video".to_string(),
                });
            }
        }
    }

    if let Ok(selector) = Selector::parse("iframe[src]") {
        for element in document.select(&selector) {
            let Some(url) = element
                .value()
                .attr("src")
                .and_then(|src| resolve_link(src, base_url))
            else {
                continue;
            };
            let host = url.host_str().unwrap_or_default().to_lowercase();
            if let Some((_, kind)) = VIDEO_HOSTS.iter().find(|(needle, _)| host.contains(needle)) {
                videos.push(Video {
                    url,
                    kind: kind.to_string(),
                });
            }
        }
    }

    videos
}

fn extract_audio(document: &Html, base_url: &Url) -> Vec<Audio> {
    let Ok(selector) = Selector::parse("audio[src], audio source[src]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|element| {
            let url = resolve_link(element.value().attr("src")?, base_url)?;
            Some(Audio { url })
        })
        .collect()
}

fn extract_documents(document: &Html, base_url: &Url) -> Vec<Document> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|a| {
            let url = resolve_link(a.value().attr("href")?, base_url)?;
            let extension = document_extension(&url)?;
            Some(Document {
                text: collapse_whitespace(&a.text().collect::<String>()),
                extension: extension.to_string(),
                url,
            })
        })
        .collect()
}
