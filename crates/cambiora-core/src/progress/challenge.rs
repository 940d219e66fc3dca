//! Daily challenges derived from a user's active habits.
//!
//! Each active habit gets exactly one companion challenge per calendar day.
//! The variant is picked from the day of year and the habit id, so every
//! caller sees the same challenge for the same habit on the same day.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::event::Subject;
use crate::calendar::DateKey;

/// One challenge offered for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyChallenge {
    /// `<habit id>-<variant>`, the subject id its completions are stored under.
    pub id: String,
    pub habit_id: String,
    pub habit_name: String,
    pub title: String,
    pub description: String,
    pub xp: u32,
    /// Whether a completion is already logged for today.
    #[serde(default)]
    pub completed: bool,
}

struct Variant {
    title: &'static str,
    description: &'static str,
    xp: u32,
}

struct Theme {
    keywords: &'static [&'static str],
    variants: [Variant; 3],
}

const fn v(title: &'static str, description: &'static str, xp: u32) -> Variant {
    Variant {
        title,
        description,
        xp,
    }
}

static THEMES: &[Theme] = &[
    Theme {
        keywords: &["exercise", "workout", "gym"],
        variants: [
            v("Pre-Workout Nutrition", "Eat a healthy meal or snack 30-60 minutes before your workout.", 25),
            v("Post-Workout Stretch", "Spend 10 minutes stretching after your workout.", 20),
            v("Track Your Workout", "Log your sets, reps or duration to see progress over time.", 20),
        ],
    },
    Theme {
        keywords: &["meditation", "mindfulness", "yoga"],
        variants: [
            v("Create a Meditation Space", "Set up a quiet, comfortable space for your practice.", 20),
            v("Practice Gratitude", "Write down 3 things you are grateful for today.", 25),
            v("Deep Breathing Exercise", "Take 5 minutes of box breathing: 4 seconds in, hold, out.", 20),
        ],
    },
    Theme {
        keywords: &["read", "book", "learning"],
        variants: [
            v("Take Reading Notes", "Write down 3 key insights or quotes from today's reading.", 25),
            v("Discuss What You Learned", "Share something you learned today with a friend or your journal.", 30),
            v("Create a Reading List", "Add 3 new books or articles to your reading list.", 20),
        ],
    },
    Theme {
        keywords: &["water", "drink", "hydration"],
        variants: [
            v("Start Your Day with Water", "Drink a full glass of water before coffee or breakfast.", 20),
            v("Eat Water-Rich Foods", "Include cucumber, watermelon or oranges in at least one meal.", 25),
            v("Set Hydration Reminders", "Set 3 reminders today and drink when they go off.", 20),
        ],
    },
    Theme {
        keywords: &["sleep", "bedtime", "rest"],
        variants: [
            v("Create a Bedtime Routine", "Follow a 30-minute wind-down routine before bed.", 25),
            v("Keep Your Room Cool", "Set your bedroom to 18-20°C for better sleep.", 20),
            v("Avoid Caffeine After 2 PM", "Skip coffee, tea and energy drinks after 2 PM.", 25),
        ],
    },
    Theme {
        keywords: &["alcohol", "sober"],
        variants: [
            v("Plan Sober Activities", "Schedule 3 alcohol-free activities for today.", 30),
            v("Practice Saying No", "Rehearse how you will decline a drink today.", 25),
            v("Track Your Progress", "Write down how many days you have been alcohol-free.", 20),
        ],
    },
    Theme {
        keywords: &["nicotine", "smoke", "smoking", "vape"],
        variants: [
            v("Use a Replacement Strategy", "When a craving hits, take a walk or do 10 push-ups instead.", 25),
            v("Avoid Triggers", "Identify and avoid 3 situations that usually trigger a craving.", 30),
            v("Celebrate Milestones", "Acknowledge your nicotine-free days with a healthy reward.", 20),
        ],
    },
];

/// Fallback for habits no theme matches. `{habit}` is replaced by the name.
static GENERIC: [Variant; 3] = [
    v("Reflect on Your Progress", "Take 5 minutes to journal about how your {habit} habit helps you grow.", 25),
    v("Share Your Journey", "Tell someone about your {habit} habit and why it matters to you.", 30),
    v("Plan for Tomorrow", "Write down when and how you will do your {habit} habit tomorrow.", 20),
];

fn variants_for(name: &str) -> &'static [Variant; 3] {
    let name = name.to_lowercase();
    THEMES
        .iter()
        .find(|theme| theme.keywords.iter().any(|k| name.contains(k)))
        .map_or(&GENERIC, |theme| &theme.variants)
}

/// Variant slot for a habit on a day: day of year plus the first byte of
/// the habit id.
fn slot(habit_id: &str, day: DateKey) -> usize {
    let seed = habit_id.bytes().next().map_or(0, usize::from);
    (day.date().ordinal() as usize + seed) % 3
}

/// Today's challenges, one per active habit, in habit order.
pub fn daily_challenges(habits: &[Subject], day: DateKey) -> Vec<DailyChallenge> {
    habits
        .iter()
        .filter(|habit| habit.is_active)
        .map(|habit| {
            let index = slot(&habit.id, day);
            let variant = &variants_for(&habit.name)[index];
            DailyChallenge {
                id: format!("{}-{}", habit.id, index + 1),
                habit_id: habit.id.clone(),
                habit_name: habit.name.clone(),
                title: variant.title.to_string(),
                description: variant.description.replace("{habit}", &habit.name),
                xp: variant.xp,
                completed: false,
            }
        })
        .collect()
}
