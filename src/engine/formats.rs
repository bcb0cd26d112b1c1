//! # Resumen de Formatos
//! src/engine/formats.rs
//!
//! Convierte el JSON crudo del extractor en un `MediaInfo` acotado:
//! una entrada de video por altura (descendente) y una de audio por
//! bitrate/extensión, con entradas de respaldo cuando no hay ninguna.

use crate::engine::{MediaFormat, MediaInfo, BEST_AUDIO_SELECTOR, BEST_VIDEO_SELECTOR};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};

pub const MAX_VIDEO_FORMATS: usize = 10;
pub const MAX_AUDIO_FORMATS: usize = 6;

/// Salida de `--dump-single-json` (solo los campos que se usan)
#[derive(Debug, Default, Deserialize)]
pub struct RawInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub abr: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawFormat {
    fn has_video(&self) -> bool {
        self.vcodec.as_deref().map(|c| c != "none").unwrap_or(false)
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref().map(|c| c != "none").unwrap_or(false)
    }

    fn size(&self) -> u64 {
        self.filesize.or(self.filesize_approx).unwrap_or(0.0).max(0.0) as u64
    }
}

/// Resume la salida cruda del extractor
pub fn summarize(raw: RawInfo) -> MediaInfo {
    let mut heights = BTreeSet::new();
    let mut best_audio_size = 0u64;
    let mut seen_audio = HashSet::new();
    let mut audio: Vec<(u32, MediaFormat)> = Vec::new();

    for fmt in &raw.formats {
        if let (true, Some(height)) = (fmt.has_video(), fmt.height) {
            heights.insert(height);
        }

        if fmt.has_audio() && !fmt.has_video() {
            let ext = fmt.ext.clone().unwrap_or_else(|| "unknown".to_string());
            let abr = fmt.abr.unwrap_or(0.0) as u32;

            if abr > 0 && seen_audio.insert(format!("{}_{}", abr, ext)) {
                let size = fmt.size();
                audio.push((
                    abr,
                    MediaFormat {
                        format_id: fmt.format_id.clone(),
                        quality_label: Some(format!("{}kbps ({})", abr, ext.to_uppercase())),
                        ext,
                        resolution: None,
                        filesize: (size > 0).then_some(size),
                        has_audio: true,
                        has_video: false,
                    },
                ));
            }
            best_audio_size = best_audio_size.max(fmt.size());
        }
    }

    // Altura descendente
    let mut video_formats: Vec<MediaFormat> = heights
        .iter()
        .rev()
        .map(|&height| {
            let video_size = raw
                .formats
                .iter()
                .filter(|fmt| fmt.height == Some(height) && fmt.has_video())
                .map(RawFormat::size)
                .max()
                .unwrap_or(0);

            let resolution = format!("{}p", height);
            MediaFormat {
                format_id: format!(
                    "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
                    h = height
                ),
                ext: "mp4".to_string(),
                quality_label: Some(format!("{} (MP4)", resolution)),
                resolution: Some(resolution),
                filesize: (video_size > 0).then_some(video_size + best_audio_size),
                has_audio: true,
                has_video: true,
            }
        })
        .collect();

    // Bitrate descendente (sort estable: empate conserva el orden del extractor)
    audio.sort_by(|a, b| b.0.cmp(&a.0));
    let mut audio_formats: Vec<MediaFormat> = audio.into_iter().map(|(_, fmt)| fmt).collect();

    if video_formats.is_empty() {
        video_formats.push(MediaFormat {
            format_id: BEST_VIDEO_SELECTOR.to_string(),
            ext: "mp4".to_string(),
            resolution: Some("best".to_string()),
            filesize: None,
            has_audio: true,
            has_video: true,
            quality_label: Some("Best Quality (MP4)".to_string()),
        });
    }

    if audio_formats.is_empty() {
        audio_formats.push(MediaFormat {
            format_id: BEST_AUDIO_SELECTOR.to_string(),
            ext: "m4a".to_string(),
            resolution: None,
            filesize: None,
            has_audio: true,
            has_video: false,
            quality_label: Some("Best Audio (M4A)".to_string()),
        });
    }

    video_formats.truncate(MAX_VIDEO_FORMATS);
    audio_formats.truncate(MAX_AUDIO_FORMATS);

    MediaInfo {
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        thumbnail: raw.thumbnail,
        duration: raw.duration,
        uploader: raw.uploader,
        video_formats,
        audio_formats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: u32, size: f64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: Some("mp4".to_string()),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            height: Some(height),
            filesize: Some(size),
            ..Default::default()
        }
    }

    fn audio(id: &str, abr: f64, ext: &str, size: f64) -> RawFormat {
        RawFormat {
            format_id: id.to_string(),
            ext: Some(ext.to_string()),
            vcodec: Some("none".to_string()),
            acodec: Some("opus".to_string()),
            abr: Some(abr),
            filesize: Some(size),
            ..Default::default()
        }
    }

    #[test]
    fn test_heights_descending_with_audio_size() {
        let info = summarize(RawInfo {
            title: Some("clip".to_string()),
            formats: vec![
                video("1", 360, 100.0),
                video("2", 1080, 900.0),
                video("3", 720, 500.0),
                video("4", 1080, 1000.0),
                audio("a", 128.0, "m4a", 50.0),
            ],
            ..Default::default()
        });

        let resolutions: Vec<_> = info
            .video_formats
            .iter()
            .map(|f| f.resolution.clone().unwrap())
            .collect();
        assert_eq!(resolutions, vec!["1080p", "720p", "360p"]);

        let top = &info.video_formats[0];
        assert_eq!(top.format_id, "bestvideo[height<=1080]+bestaudio/best[height<=1080]");
        assert_eq!(top.filesize, Some(1050));
        assert_eq!(top.quality_label.as_deref(), Some("1080p (MP4)"));
    }

    #[test]
    fn test_audio_dedup_and_sorted_by_bitrate() {
        let info = summarize(RawInfo {
            formats: vec![
                audio("a", 64.0, "webm", 10.0),
                audio("b", 160.0, "webm", 30.0),
                audio("c", 160.0, "webm", 31.0),
                audio("d", 128.0, "m4a", 20.0),
                audio("e", 0.0, "m4a", 5.0),
            ],
            ..Default::default()
        });

        let ids: Vec<_> = info.audio_formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
        assert_eq!(info.audio_formats[0].quality_label.as_deref(), Some("160kbps (WEBM)"));
        assert_eq!(info.title, "Unknown");
    }

    #[test]
    fn test_fallbacks_when_no_formats() {
        let info = summarize(RawInfo::default());

        assert_eq!(info.video_formats.len(), 1);
        assert_eq!(info.video_formats[0].format_id, BEST_VIDEO_SELECTOR);
        assert_eq!(info.audio_formats.len(), 1);
        assert_eq!(info.audio_formats[0].format_id, BEST_AUDIO_SELECTOR);
    }

    #[test]
    fn test_caps_format_lists() {
        let mut formats = Vec::new();
        for i in 0..15u32 {
            formats.push(video(&i.to_string(), 100 + i * 10, 1.0));
            formats.push(audio(&format!("a{}", i), 32.0 + i as f64, "webm", 1.0));
        }

        let info = summarize(RawInfo { formats, ..Default::default() });
        assert_eq!(info.video_formats.len(), MAX_VIDEO_FORMATS);
        assert_eq!(info.audio_formats.len(), MAX_AUDIO_FORMATS);
    }

    #[test]
    fn test_parses_extractor_json() {
        let json = r#"{
            "title": "Example",
            "duration": 12.5,
            "formats": [
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 360},
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 129.5}
            ]
        }"#;

        let raw: RawInfo = serde_json::from_str(json).unwrap();
        let info = summarize(raw);

        assert_eq!(info.title, "Example");
        assert_eq!(info.duration, Some(12.5));
        assert_eq!(info.video_formats[0].resolution.as_deref(), Some("360p"));
        assert_eq!(info.video_formats[0].filesize, None);
        assert_eq!(info.audio_formats[0].format_id, "140");
    }
}
