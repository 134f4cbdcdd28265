//! Discovery catalog
//!
//! Static question data: the fourteen life categories, the step-1 template of
//! each category that has one, the step-2 drill-downs, and the shared step-3
//! rhythm question. The option tables are compile-time constants; the lookup
//! indexes over them are built once on first use.

use sdk::types::{DrillDownQuestionView, OptionView, QuestionView};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A life-vision category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub key: &'static str,
    pub label: &'static str,
}

/// One selectable option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOption {
    pub id: &'static str,
    pub label: &'static str,
    pub sublabel: &'static str,
    pub icon: &'static str,
    /// Internal categorization only, never sent to clients
    pub internal_note: Option<&'static str>,
    /// The client shows a free-text box with this option
    pub input_field: bool,
}

impl DiscoveryOption {
    pub fn view(&self) -> OptionView {
        OptionView {
            id: self.id.to_string(),
            label: self.label.to_string(),
            sublabel: self.sublabel.to_string(),
            icon: self.icon.to_string(),
            input_field: self.input_field.then_some(true),
        }
    }
}

/// A question with its options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryQuestion {
    pub step: u8,
    pub text: &'static str,
    pub ai_message: &'static str,
    pub options: &'static [DiscoveryOption],
    pub multi_select: bool,
}

impl DiscoveryQuestion {
    pub fn view(&self) -> QuestionView {
        QuestionView {
            text: self.text.to_string(),
            options: self.options.iter().map(DiscoveryOption::view).collect(),
            multi_select: self.multi_select,
        }
    }

    pub fn option(&self, id: &str) -> Option<&'static DiscoveryOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// A step-2 follow-up, offered when its trigger option was picked in step 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrillDown {
    pub key: &'static str,
    pub trigger: &'static str,
    pub text: &'static str,
    pub options: &'static [DiscoveryOption],
}

impl DrillDown {
    pub fn view(&self) -> DrillDownQuestionView {
        DrillDownQuestionView {
            question_key: self.key.to_string(),
            text: self.text.to_string(),
            options: self.options.iter().map(DiscoveryOption::view).collect(),
            multi_select: true,
        }
    }

    pub fn option(&self, id: &str) -> Option<&'static DiscoveryOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

const fn opt(
    id: &'static str,
    label: &'static str,
    sublabel: &'static str,
    icon: &'static str,
    internal_note: &'static str,
) -> DiscoveryOption {
    DiscoveryOption {
        id,
        label,
        sublabel,
        icon,
        internal_note: Some(internal_note),
        input_field: false,
    }
}

const fn plain(
    id: &'static str,
    label: &'static str,
    sublabel: &'static str,
    icon: &'static str,
) -> DiscoveryOption {
    DiscoveryOption {
        id,
        label,
        sublabel,
        icon,
        internal_note: None,
        input_field: false,
    }
}

const fn free_text(
    id: &'static str,
    label: &'static str,
    sublabel: &'static str,
    icon: &'static str,
) -> DiscoveryOption {
    DiscoveryOption {
        id,
        label,
        sublabel,
        icon,
        internal_note: None,
        input_field: true,
    }
}

pub const CATEGORIES: &[Category] = &[
    Category { key: "forward", label: "Forward" },
    Category { key: "fun", label: "Fun / Recreation" },
    Category { key: "health", label: "Health / Vitality" },
    Category { key: "travel", label: "Travel / Adventure" },
    Category { key: "love", label: "Love / Romance" },
    Category { key: "family", label: "Family / Parenting" },
    Category { key: "social", label: "Social / Friends" },
    Category { key: "home", label: "Home / Environment" },
    Category { key: "work", label: "Work / Business" },
    Category { key: "money", label: "Money / Wealth" },
    Category { key: "stuff", label: "Possessions / Stuff" },
    Category { key: "giving", label: "Giving / Legacy" },
    Category { key: "spirituality", label: "Spirituality" },
    Category { key: "conclusion", label: "Conclusion" },
];

const FORWARD_OPTIONS: &[DiscoveryOption] = &[
    opt("clarity", "Getting Clear", "knowing what I want", "🎯", "Values direction and focus"),
    opt("transformation", "Transformation", "becoming the best version of myself", "✨", "Growth-oriented"),
    opt("manifestation", "Manifestation", "creating my dream life", "🌈", "Action and results focused"),
    opt("alignment", "Alignment", "living in harmony with my true self", "🧘", "Authenticity-focused"),
    opt("purpose", "Purpose", "discovering my path and meaning", "🌟", "Meaning-seeker"),
    opt("freedom", "Freedom", "living life on my terms", "🦅", "Autonomy-focused"),
    free_text("other", "Something else", "tell me more", "💭"),
];

const FUN_OPTIONS: &[DiscoveryOption] = &[
    opt("physical", "Physical/Active", "sports, dancing, hiking, movement", "🏃", "Body-based joy, kinesthetic"),
    opt("creative", "Creative", "art, music, writing, building", "🎨", "Expression-based joy, making things"),
    opt("social", "Social", "games, parties, hanging with friends", "👥", "Connection-based joy, community"),
    opt("adventurous", "Adventurous", "exploring, trying new things", "🌄", "Discovery-based joy, novelty"),
    opt("relaxing", "Relaxing", "reading, nature, gentle activities", "🌿", "Peace-based joy, restoration"),
    opt("learning", "Learning", "classes, workshops, new skills", "📚", "Growth-based joy, mastery"),
    opt("playful", "Playful", "silly, childlike, spontaneous", "🎈", "Freedom-based joy, no rules"),
    free_text("other", "Something else", "tell me more", "✨"),
];

const TRAVEL_OPTIONS: &[DiscoveryOption] = &[
    opt("nature", "Nature Adventures", "mountains, beaches, wilderness", "🏔️", "Connection to earth and outdoors"),
    opt("cultural", "Cultural Immersion", "new cities, different cultures", "🌍", "Learning through experience"),
    opt("spiritual", "Spiritual Journeys", "sacred sites, retreats, pilgrimages", "🕉️", "Seeking deeper meaning"),
    opt("adventure", "Thrill & Adventure", "activities, challenges, adrenaline", "🪂", "Physical excitement and challenge"),
    opt("relaxation", "Relaxation Retreats", "resorts, spas, peaceful escapes", "🌴", "Rest and rejuvenation"),
    opt("foodie", "Culinary Journeys", "food tours, cooking experiences", "🍜", "Exploration through taste"),
    opt("spontaneous", "Spontaneous Road Trips", "just go, no fixed plans", "🚗", "Freedom and spontaneity"),
    free_text("other", "Something else", "tell me more", "✨"),
];

const TEMPLATES: &[(&str, DiscoveryQuestion)] = &[
    (
        "forward",
        DiscoveryQuestion {
            step: 1,
            text: "What aspects of your vision journey call to you?",
            ai_message: "Let's discover what excites you about creating your life vision! 🌟\n\nNo pressure - just choose what resonates. Pick as many as you want:",
            options: FORWARD_OPTIONS,
            multi_select: true,
        },
    ),
    (
        "fun",
        DiscoveryQuestion {
            step: 1,
            text: "What kind of fun calls to you?",
            ai_message: "Let's discover what lights you up! 🧭\n\nNo pressure - just choose what resonates. Pick as many as you want:",
            options: FUN_OPTIONS,
            multi_select: true,
        },
    ),
    (
        "travel",
        DiscoveryQuestion {
            step: 1,
            text: "What kind of adventures excite you?",
            ai_message: "Let's explore what makes your spirit come alive! ✈️\n\nChoose the types of travel and adventure that call to you:",
            options: TRAVEL_OPTIONS,
            multi_select: true,
        },
    ),
];

const CREATIVE_TYPES: &[DiscoveryOption] = &[
    plain("visual", "Visual arts", "painting, drawing, photography", "🎨"),
    plain("music", "Music", "playing, singing, listening live", "🎵"),
    plain("writing", "Writing", "journaling, stories, poetry", "✍️"),
    plain("crafts", "Crafts/Making", "pottery, woodwork, DIY", "🛠️"),
    plain("performance", "Performance", "dance, theater, improv", "🎭"),
    plain("digital", "Digital creation", "design, video, coding", "💻"),
    free_text("other_creative", "Other", "", "✨"),
];

const ADVENTURE_TYPES: &[DiscoveryOption] = &[
    plain("nature", "Nature adventures", "hiking, camping, exploring outdoors", "🏕️"),
    plain("travel", "Travel", "new cities, new countries", "✈️"),
    plain("urban", "Urban exploration", "new neighborhoods, hidden spots", "🏙️"),
    plain("spontaneous", "Spontaneous day trips", "just go somewhere new", "🚗"),
    plain("cultural", "Cultural experiences", "festivals, museums, events", "🎭"),
    plain("food", "Food adventures", "new restaurants, cooking new cuisines", "🍜"),
    free_text("other_adventure", "Other", "", "✨"),
];

const PLAYFUL_EXPRESSION: &[DiscoveryOption] = &[
    plain("games", "Games", "board games, video games, party games", "🎮"),
    plain("silly", "Being silly", "not taking things seriously, laughing", "😄"),
    plain("spontaneous_play", "Spontaneous", "unplanned, following impulses", "🎈"),
    plain("childlike", "Childlike activities", "playgrounds, building forts, etc.", "🧸"),
    plain("experimental", "Experimenting", "trying new things without judgment", "🔬"),
    free_text("other_playful", "Other", "", "✨"),
];

const DRILL_DOWNS: &[(&str, &[DrillDown])] = &[(
    "fun",
    &[
        DrillDown {
            key: "creative_types",
            trigger: "creative",
            text: "What kind of creative expression lights you up?",
            options: CREATIVE_TYPES,
        },
        DrillDown {
            key: "adventure_types",
            trigger: "adventurous",
            text: "What kind of adventures call to you?",
            options: ADVENTURE_TYPES,
        },
        DrillDown {
            key: "playful_expression",
            trigger: "playful",
            text: "How does your playful side love to come out?",
            options: PLAYFUL_EXPRESSION,
        },
    ],
)];

const RHYTHM_OPTIONS: &[DiscoveryOption] = &[
    opt("daily", "Little moments daily", "Small doses of joy throughout the week", "☀️", "Wants fun integrated into everyday"),
    opt("weekly", "Weekly rituals", "Dedicated time each week for hobbies", "📅", "Wants structure around fun time"),
    opt("spontaneous_rhythm", "Spontaneous bursts", "Whenever inspiration strikes, follow it", "✨", "Wants total freedom, no schedule"),
    opt("weekends", "Weekend adventures", "Weekdays for work, weekends for play", "🎉", "Wants clear separation"),
    opt("balanced", "All of the above!", "Different rhythms for different activities", "🌈", "Wants variety in how fun shows up"),
];

pub static RHYTHM_QUESTION: DiscoveryQuestion = DiscoveryQuestion {
    step: 3,
    text: "When you imagine your ideal week with all this woven in, how does it show up?",
    ai_message: "One last question to make this really YOU:",
    options: RHYTHM_OPTIONS,
    multi_select: false,
};

/// Immutable index over the static tables
#[derive(Debug)]
pub struct Catalog {
    by_name: HashMap<String, &'static Category>,
    templates: HashMap<&'static str, &'static DiscoveryQuestion>,
    drill_downs: HashMap<&'static str, &'static [DrillDown]>,
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

/// The process-wide catalog
pub fn catalog() -> &'static Catalog {
    CATALOG.get_or_init(|| {
        let mut by_name = HashMap::new();
        for category in CATEGORIES {
            by_name.insert(category.key.to_lowercase(), category);
            by_name.insert(category.label.to_lowercase(), category);
        }

        Catalog {
            by_name,
            templates: TEMPLATES.iter().map(|(k, q)| (*k, q)).collect(),
            drill_downs: DRILL_DOWNS.iter().map(|(k, d)| (*k, *d)).collect(),
        }
    })
}

impl Catalog {
    pub fn categories(&self) -> &'static [Category] {
        CATEGORIES
    }

    /// Match a category by key or display label, trimmed and case-insensitive
    pub fn resolve_category(&self, name: &str) -> Option<&'static Category> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    /// Step-1 question for a category key
    pub fn template(&self, category_key: &str) -> Option<&'static DiscoveryQuestion> {
        self.templates.get(category_key).copied()
    }

    pub fn rhythm(&self) -> &'static DiscoveryQuestion {
        &RHYTHM_QUESTION
    }

    /// A drill-down of a category by its question key
    pub fn drill_down(&self, category_key: &str, key: &str) -> Option<&'static DrillDown> {
        self.drill_downs
            .get(category_key)
            .and_then(|all| all.iter().find(|d| d.key == key))
    }

    /// Drill-downs offered for a set of step-1 selections, in catalog order
    pub fn drill_downs(&self, category_key: &str, selections: &[String]) -> Vec<&'static DrillDown> {
        self.drill_downs
            .get(category_key)
            .map(|all| {
                all.iter()
                    .filter(|d| selections.iter().any(|s| s == d.trigger))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolve a category name against the shared catalog
pub fn resolve_category(name: &str) -> Option<&'static Category> {
    catalog().resolve_category(name)
}

/// Step-2 questions for a category and its step-1 selections
///
/// Accepts the category key or label. Unknown categories and options yield
/// no questions.
pub fn drill_down_questions(category: &str, selections: &[String]) -> Vec<DrillDownQuestionView> {
    let Some(category) = resolve_category(category) else {
        return Vec::new();
    };

    catalog()
        .drill_downs(category.key, selections)
        .into_iter()
        .map(DrillDown::view)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fourteen_categories() {
        assert_eq!(catalog().categories().len(), 14);
    }

    #[test]
    fn test_resolve_category_by_key_or_label() {
        assert_eq!(resolve_category("fun").map(|c| c.key), Some("fun"));
        assert_eq!(
            resolve_category("  Fun / Recreation ").map(|c| c.key),
            Some("fun")
        );
        assert_eq!(resolve_category("TRAVEL").map(|c| c.key), Some("travel"));
        assert_eq!(
            resolve_category("money / wealth").map(|c| c.label),
            Some("Money / Wealth")
        );
        assert!(resolve_category("cooking").is_none());
    }

    #[test]
    fn test_templates_only_for_three_categories() {
        let catalog = catalog();
        for key in ["forward", "fun", "travel"] {
            let template = catalog.template(key).unwrap();
            assert_eq!(template.step, 1);
            assert!(template.multi_select);
        }
        assert!(catalog.template("love").is_none());
        assert!(catalog.template("home").is_none());
    }

    #[test]
    fn test_option_view_hides_internal_note() {
        let template = catalog().template("fun").unwrap();
        let creative = template.option("creative").unwrap();
        assert!(creative.internal_note.is_some());

        let json = serde_json::to_value(creative.view()).unwrap();
        assert_eq!(json["id"], "creative");
        assert!(json.get("internalNote").is_none());
        assert!(json.get("internal_note").is_none());
        assert!(json.get("inputField").is_none());

        let other = serde_json::to_value(template.option("other").unwrap().view()).unwrap();
        assert_eq!(other["inputField"], true);
    }

    #[test]
    fn test_drill_downs_for_fun() {
        let keys: Vec<String> = drill_down_questions("Fun / Recreation", &ids(&["creative", "adventurous"]))
            .into_iter()
            .map(|q| q.question_key)
            .collect();
        assert_eq!(keys, vec!["creative_types", "adventure_types"]);

        // Catalog order regardless of selection order
        let keys: Vec<String> = drill_down_questions("fun", &ids(&["playful", "creative"]))
            .into_iter()
            .map(|q| q.question_key)
            .collect();
        assert_eq!(keys, vec!["creative_types", "playful_expression"]);
    }

    #[test]
    fn test_no_drill_downs_elsewhere() {
        assert!(drill_down_questions("fun", &ids(&["physical", "social"])).is_empty());
        assert!(drill_down_questions("travel", &ids(&["nature", "cultural"])).is_empty());
        assert!(drill_down_questions("nowhere", &ids(&["creative"])).is_empty());
    }

    #[test]
    fn test_rhythm_question_is_single_select() {
        let rhythm = catalog().rhythm();
        assert!(!rhythm.multi_select);
        assert_eq!(rhythm.options.len(), 5);
        assert!(rhythm.option("spontaneous_rhythm").is_some());
    }
}
