use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Career themes the generator knows costume/setting detail for. Anything
/// else parses into `Unknown` and gets a generic costume description instead
/// of being rejected; the fallback is policy, so it is a variant rather than
/// a map default.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Theme {
    Astronaut,
    Doctor,
    Scientist,
    KpopStar,
    Chef,
    Pilot,
    Athlete,
    Artist,
    Firefighter,
    Police,
    Teacher,
    Veterinarian,
    #[strum(default)]
    Unknown(String),
}

impl Theme {
    /// Free themes per the free-tier configuration; everything else is paid.
    pub fn is_free(&self) -> bool {
        matches!(self, Theme::Astronaut | Theme::Doctor | Theme::Scientist)
    }

    /// Costume and setting detail fed into the edit instruction.
    pub fn description(&self) -> String {
        match self {
            Theme::Astronaut => {
                "a white NASA-style astronaut suit with helmet under one arm, standing in a space station".to_string()
            }
            Theme::Doctor => {
                "a white doctor's coat with a stethoscope, in a bright modern hospital ward".to_string()
            }
            Theme::Scientist => {
                "a lab coat and safety goggles, surrounded by glassware in a research laboratory".to_string()
            }
            Theme::KpopStar => {
                "a sparkling stage outfit with a microphone, on a concert stage with colorful lights".to_string()
            }
            Theme::Chef => {
                "a chef's whites and toque, in a professional restaurant kitchen".to_string()
            }
            Theme::Pilot => {
                "an airline captain's uniform with gold stripes, in an airliner cockpit".to_string()
            }
            Theme::Athlete => {
                "a sports jersey holding a trophy, inside a packed stadium".to_string()
            }
            Theme::Artist => {
                "a paint-splattered smock holding a palette and brush, in a sunlit art studio".to_string()
            }
            Theme::Firefighter => {
                "firefighter turnout gear with a helmet, in front of a fire engine".to_string()
            }
            Theme::Police => {
                "a police officer's uniform with a badge, in front of a patrol car".to_string()
            }
            Theme::Teacher => {
                "smart casual clothes holding a book, in front of a classroom chalkboard".to_string()
            }
            Theme::Veterinarian => {
                "a veterinarian's scrubs holding a puppy, in an animal clinic".to_string()
            }
            Theme::Unknown(label) => format!("a {} costume", label),
        }
    }
}

/// Output aspect-ratio class. Square is the free default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Square,
    Portrait,
    Landscape,
}

impl ImageFormat {
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            ImageFormat::Square => "1:1",
            ImageFormat::Portrait => "3:4",
            ImageFormat::Landscape => "16:9",
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Square
    }
}

/// Framing class. `Portrait` (upper body) is the free default; the provider
/// has no structured parameter for this, so it is rendered into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Portrait,
    FullBody,
    Headshot,
}

impl ShotType {
    pub fn framing_text(&self) -> &'static str {
        match self {
            ShotType::Portrait => "an upper-body portrait showing face and shoulders",
            ShotType::FullBody => "a full-body shot from head to toe",
            ShotType::Headshot => "a close-up headshot of the face",
        }
    }
}

impl Default for ShotType {
    fn default() -> Self {
        ShotType::Portrait
    }
}

/// Retention windows. Free-tier results are short-lived by design; paid
/// results live long enough to download and share.
pub const FREE_RETENTION_HOURS: i64 = 2;
pub const PAID_RETENTION_HOURS: i64 = 48;

/// A persisted generation result. Exactly one of `is_free_tier` /
/// `credits_used == 1` holds for any record that reached the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub account_id: Uuid,
    pub storage_path: String,
    pub public_url: String,
    pub prompt: String,
    pub theme: String,
    pub format: ImageFormat,
    pub shot_type: ShotType,
    pub is_public: bool,
    pub is_free_tier: bool,
    pub credits_used: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedImage {
    #[allow(clippy::too_many_arguments)]
    fn new(
        account_id: Uuid,
        storage_path: String,
        public_url: String,
        prompt: String,
        theme: &Theme,
        format: ImageFormat,
        shot_type: ShotType,
        is_free_tier: bool,
        retention_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            storage_path,
            public_url,
            prompt,
            theme: theme.to_string(),
            format,
            shot_type,
            is_public: false,
            is_free_tier,
            credits_used: if is_free_tier { 0 } else { 1 },
            expires_at: Some(now + Duration::hours(retention_hours)),
            created_at: now,
        }
    }

    pub fn new_free(
        account_id: Uuid,
        storage_path: String,
        public_url: String,
        prompt: String,
        theme: &Theme,
        format: ImageFormat,
        shot_type: ShotType,
    ) -> Self {
        Self::new(
            account_id,
            storage_path,
            public_url,
            prompt,
            theme,
            format,
            shot_type,
            true,
            FREE_RETENTION_HOURS,
        )
    }

    pub fn new_paid(
        account_id: Uuid,
        storage_path: String,
        public_url: String,
        prompt: String,
        theme: &Theme,
        format: ImageFormat,
        shot_type: ShotType,
    ) -> Self {
        Self::new(
            account_id,
            storage_path,
            public_url,
            prompt,
            theme,
            format,
            shot_type,
            false,
            PAID_RETENTION_HOURS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn theme_parsing_round_trips_known_ids() {
        assert_eq!(Theme::from_str("kpop_star").unwrap(), Theme::KpopStar);
        assert_eq!(Theme::KpopStar.to_string(), "kpop_star");
        assert_eq!(Theme::from_str("astronaut").unwrap(), Theme::Astronaut);
    }

    #[test]
    fn unknown_theme_falls_back_to_generic_costume() {
        let theme = Theme::from_str("wizard").unwrap();
        assert_eq!(theme, Theme::Unknown("wizard".to_string()));
        assert_eq!(theme.description(), "a wizard costume");
        assert!(!theme.is_free());
    }

    #[test]
    fn only_the_configured_themes_are_free() {
        assert!(Theme::Astronaut.is_free());
        assert!(Theme::Doctor.is_free());
        assert!(Theme::Scientist.is_free());
        assert!(!Theme::KpopStar.is_free());
        assert!(!Theme::Firefighter.is_free());
    }

    #[test]
    fn free_image_expires_two_hours_after_creation() {
        let image = GeneratedImage::new_free(
            Uuid::new_v4(),
            "generated/x/1.jpg".to_string(),
            "https://cdn/x/1.jpg".to_string(),
            "prompt".to_string(),
            &Theme::Astronaut,
            ImageFormat::Square,
            ShotType::Portrait,
        );
        assert!(image.is_free_tier);
        assert_eq!(image.credits_used, 0);
        assert_eq!(
            image.expires_at.unwrap(),
            image.created_at + Duration::hours(FREE_RETENTION_HOURS)
        );
    }

    #[test]
    fn paid_image_consumes_one_credit_and_expires_after_48h() {
        let image = GeneratedImage::new_paid(
            Uuid::new_v4(),
            "generated/x/2.jpg".to_string(),
            "https://cdn/x/2.jpg".to_string(),
            "prompt".to_string(),
            &Theme::KpopStar,
            ImageFormat::Landscape,
            ShotType::FullBody,
        );
        assert!(!image.is_free_tier);
        assert_eq!(image.credits_used, 1);
        assert_eq!(
            image.expires_at.unwrap(),
            image.created_at + Duration::hours(PAID_RETENTION_HOURS)
        );
    }
}
