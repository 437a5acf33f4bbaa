use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::Serialize;

/// "People & Blogs".
const VIDEO_CATEGORY: &str = "22";
const PRIVACY_STATUS: &str = "public";

/// Title/description presets rotated across uploads.
const LISTINGS: &[(&str, &str)] = &[
    (
        "Peaceful Ocean Breeze 🌊 #Calming #SleepMusic",
        "Relax and breathe deeply as the calming ocean breeze sweeps through your mind. \
         Perfect for meditation or simply unwinding after a long day. #OceanSounds #Meditation #StressRelief",
    ),
    (
        "Gentle Forest Sounds 🌳 #NatureLovers #Zen",
        "Immerse yourself in the gentle whispers of the forest. Birds chirp peacefully and \
         leaves rustle in the wind. Perfect for meditation and relaxation. #ForestSounds #NatureSounds #Mindfulness",
    ),
    (
        "Tranquil Rainstorm Sounds 🌧️ #CalmingVibes #PeacefulSleep",
        "Feel the calming presence of a gentle rainstorm. The steady rhythm of raindrops \
         creates a peaceful atmosphere, ideal for soothing your mind after a busy day. #RainSounds #SleepMusic #Relaxation",
    ),
    (
        "Deep Sleep Music 😴 #DeepSleepMusic #RestfulNight",
        "Gentle music designed to guide you into deep, restful sleep. Let the peaceful \
         melodies ease your mind and help you let go of stress. #SleepMusic #DeepSleep #Meditation",
    ),
    (
        "Zen Garden Ambience 🏞️ #PeacefulMusic #Tranquility",
        "Relax in the tranquility of a Zen garden, surrounded by the calming sounds of \
         nature. A calming environment that promotes relaxation and clears your mind. #ZenGarden #Mindfulness #StressRelief",
    ),
    (
        "Meditative Ocean Waves 🌊 #PeacefulSleep #Tranquil",
        "Let the soothing sound of ocean waves calm your mind and soul. The ebb and flow \
         of the tide promotes relaxation and mindfulness. #OceanWaves #Meditation #CalmingVibes",
    ),
];

/// Curated tag vocabulary sampled per upload.
pub const TAG_VOCABULARY: &[&str] = &[
    "relaxation",
    "meditation",
    "sleep music",
    "calming music",
    "stress relief",
    "mindfulness",
    "ambient music",
    "deep sleep",
    "nature sounds",
    "peaceful music",
    "zen",
    "calm",
    "study music",
    "focus music",
    "ocean sounds",
    "rain sounds",
    "forest sounds",
    "white noise",
    "healing music",
    "soothing sounds",
    "tranquility",
    "yoga music",
    "spa music",
    "background music",
    "insomnia relief",
    "anxiety relief",
    "breathing exercise",
    "soundscape",
    "slow music",
    "piano relaxation",
    "meditation music",
    "sleep aid",
    "wellness",
    "serenity",
    "mind relaxation",
    "night sounds",
    "water sounds",
    "gentle music",
    "soft music",
    "dreamy music",
];

/// Snippet/status body of the upload initiation request.
#[derive(Debug, Serialize)]
pub struct VideoResource {
    pub snippet: VideoSnippet,
    pub status: VideoStatus,
}

#[derive(Debug, Serialize)]
pub struct VideoSnippet {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

#[derive(Debug, Serialize)]
pub struct VideoStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: String,
}

#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl UploadMetadata {
    /// Pick a listing preset and a fresh tag sample for one upload.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, tag_count: usize) -> Self {
        let (title, description) = LISTINGS
            .choose(rng)
            .copied()
            .expect("listing presets are non-empty");
        Self {
            title: title.to_string(),
            description: description.to_string(),
            tags: sample_tags(rng, tag_count),
            category_id: VIDEO_CATEGORY.to_string(),
            privacy_status: PRIVACY_STATUS.to_string(),
        }
    }

    pub fn request_body(&self) -> VideoResource {
        VideoResource {
            snippet: VideoSnippet {
                title: self.title.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                category_id: self.category_id.clone(),
            },
            status: VideoStatus {
                privacy_status: self.privacy_status.clone(),
            },
        }
    }
}

/// Fixed-size sample without replacement; the whole vocabulary when `count`
/// exceeds it.
pub fn sample_tags<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<String> {
    let mut pool: Vec<&str> = TAG_VOCABULARY.to_vec();
    pool.shuffle(rng);
    pool.truncate(count.min(TAG_VOCABULARY.len()));
    pool.into_iter().map(|tag| tag.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_sample_has_requested_size_without_duplicates() {
        let mut rng = StdRng::seed_from_u64(9);
        let tags = sample_tags(&mut rng, 30);
        assert_eq!(tags.len(), 30);

        let unique: HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
        for tag in &tags {
            assert!(TAG_VOCABULARY.contains(&tag.as_str()));
        }
    }

    #[test]
    fn test_oversized_sample_returns_whole_vocabulary() {
        let mut rng = StdRng::seed_from_u64(9);
        let tags = sample_tags(&mut rng, TAG_VOCABULARY.len() + 50);
        assert_eq!(tags.len(), TAG_VOCABULARY.len());
    }

    #[test]
    fn test_sampling_is_deterministic_for_a_seed() {
        let a = sample_tags(&mut StdRng::seed_from_u64(42), 10);
        let b = sample_tags(&mut StdRng::seed_from_u64(42), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_metadata_uses_fixed_category_and_visibility() {
        let mut rng = StdRng::seed_from_u64(3);
        let metadata = UploadMetadata::generate(&mut rng, 30);
        assert_eq!(metadata.category_id, "22");
        assert_eq!(metadata.privacy_status, "public");
        assert!(!metadata.title.is_empty());
        assert!(!metadata.description.is_empty());
        assert_eq!(metadata.tags.len(), 30);
    }

    #[test]
    fn test_request_body_field_names() {
        let mut rng = StdRng::seed_from_u64(3);
        let metadata = UploadMetadata::generate(&mut rng, 2);
        let json = serde_json::to_value(metadata.request_body()).unwrap();

        assert!(json["snippet"]["title"].is_string());
        assert!(json["snippet"]["tags"].is_array());
        assert_eq!(json["snippet"]["categoryId"], "22");
        assert_eq!(json["status"]["privacyStatus"], "public");
    }
}
