//! Prompt construction and fixed fallback texts for the discovery flow

use sdk::types::PatternDetected;

use super::catalog::{catalog, Category, DiscoveryOption};
use crate::db::{PreviousVision, StepRecord};
use crate::llm::{extract_json_object, Message};

pub const FALLBACK_ACKNOWLEDGMENT: &str =
    "Beautiful choices! Let's go a little deeper into what really lights you up.";
pub const FALLBACK_PATTERN_THEME: &str = "variety and exploration";
pub const FALLBACK_PATTERN_EVIDENCE: &str = "You are drawn to many different kinds of experiences";
pub const FALLBACK_PATTERN_MESSAGE: &str =
    "I'm noticing a beautiful pattern in everything you've shared. Let's bring it all together.";
pub const FALLBACK_VISION: &str = "Your vision is being created...";

pub const VIVA_SYSTEM_PROMPT: &str = "You are VIVA, the Vibe Assistant of VibrationFit. You help people write \
present-tense life vision statements, one life category at a time.

How you speak:
- Warm and intuitive, speaking to the soul rather than reciting a checklist.
- Inclusion-based: talk about what the person wants, never about what they want to avoid.
- Mirror the person's own words and phrases back to them.
- Guide gently. Never interrogate.

How visions are written:
- First person, present tense (\"I am\", \"I have\", \"I love\").
- Two or three paragraphs that are emotionally vivid.
- Centered on how life feels, not only on circumstances.
- Built from the exact vocabulary the person chose.";

/// The fixed pattern used when detection is skipped or unparseable
pub fn fallback_pattern() -> PatternDetected {
    PatternDetected {
        theme: FALLBACK_PATTERN_THEME.to_string(),
        evidence: vec![FALLBACK_PATTERN_EVIDENCE.to_string()],
    }
}

/// Closing line sent with a generated vision
pub fn closing_message(category: &Category) -> String {
    format!(
        "Here is your {} vision, written from everything you shared. Read it out loud and notice how it feels... does this feel like YOU?",
        category.label
    )
}

fn describe(option: &DiscoveryOption) -> String {
    if option.sublabel.is_empty() {
        option.label.to_string()
    } else {
        format!("{} ({})", option.label, option.sublabel)
    }
}

/// Render selected broad options as "Label (sublabel), ..."
fn describe_broad(category: &Category, selections: &[String]) -> String {
    let template = catalog().template(category.key);
    selections
        .iter()
        .map(|id| {
            template
                .and_then(|t| t.option(id))
                .map(describe)
                .unwrap_or_else(|| id.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render drill-down answers one question per line
fn describe_drill_downs(
    category: &Category,
    broad: &[String],
    answers: &std::collections::BTreeMap<String, Vec<String>>,
) -> String {
    let offered = catalog().drill_downs(category.key, broad);
    let mut lines = Vec::new();

    for (key, ids) in answers {
        if ids.is_empty() {
            continue;
        }
        let drill_down = offered.iter().find(|d| d.key == key.as_str());
        let picked = ids
            .iter()
            .map(|id| {
                drill_down
                    .and_then(|d| d.option(id))
                    .map(describe)
                    .unwrap_or_else(|| id.clone())
            })
            .collect::<Vec<_>>()
            .join(", ");
        let question = drill_down.map(|d| d.text).unwrap_or(key.as_str());
        lines.push(format!("- {} {}", question, picked));
    }

    if lines.is_empty() {
        "- (no follow-up answers)".to_string()
    } else {
        lines.join("\n")
    }
}

fn describe_rhythm(selection: &str) -> String {
    catalog()
        .rhythm()
        .option(selection)
        .map(describe)
        .unwrap_or_else(|| selection.to_string())
}

/// Step 1: short acknowledgment of the broad selections
pub fn acknowledgment_messages(
    category: &Category,
    selections: &[String],
    custom_input: Option<&str>,
) -> Vec<Message> {
    let mut prompt = format!(
        "For their {} vision the user picked: {}.",
        category.label,
        describe_broad(category, selections)
    );
    if let Some(custom) = custom_input {
        prompt.push_str(&format!(" In their own words: \"{}\".", custom));
    }
    prompt.push_str(
        "\n\nReply with 2-3 warm sentences that reflect these choices back using their words, \
         then invite them to go a little deeper. No questions lists, no bullet points.",
    );

    vec![Message::system(VIVA_SYSTEM_PROMPT), Message::user(prompt)]
}

/// Step 2: ask for a theme across everything picked so far, as JSON
pub fn pattern_detection_messages(
    category: &Category,
    broad: &[String],
    custom_input: Option<&str>,
    drill_downs: &std::collections::BTreeMap<String, Vec<String>>,
) -> Vec<Message> {
    let mut prompt = format!(
        "Category: {}\nBroad choices: {}\n",
        category.label,
        describe_broad(category, broad)
    );
    if let Some(custom) = custom_input {
        prompt.push_str(&format!("Their own words: \"{}\"\n", custom));
    }
    prompt.push_str(&format!(
        "Follow-up answers:\n{}\n\n",
        describe_drill_downs(category, broad, drill_downs)
    ));
    prompt.push_str(
        "Name the single pattern running through these choices as a theme of 2-4 words, \
         and list the choices that show it. Respond with JSON only, shaped exactly as \
         {\"theme\": \"...\", \"evidence\": [\"...\", \"...\"]}.",
    );

    vec![
        Message::system("You find emotional patterns in people's choices and answer in strict JSON."),
        Message::user(prompt),
    ]
}

/// Parse the detector's output; `None` if it is not usable
pub fn parse_pattern(text: &str) -> Option<PatternDetected> {
    let value = extract_json_object(text)?;
    let theme = value.get("theme")?.as_str()?.trim();
    if theme.is_empty() {
        return None;
    }

    let evidence = value
        .get("evidence")
        .and_then(|e| e.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(PatternDetected {
        theme: theme.to_string(),
        evidence,
    })
}

/// Step 2: the longer message that names the theme back to the user
pub fn pattern_message_messages(category: &Category, pattern: &PatternDetected) -> Vec<Message> {
    let evidence = if pattern.evidence.is_empty() {
        String::new()
    } else {
        format!(" It shows up in: {}.", pattern.evidence.join("; "))
    };

    let prompt = format!(
        "While exploring their {} vision, the user's choices reveal a theme of \"{}\".{}\n\n\
         Write 3-4 sentences that name this theme back to them explicitly and celebrate it, \
         then lead into one last question about how it fits into their week.",
        category.label, pattern.theme, evidence
    );

    vec![Message::system(VIVA_SYSTEM_PROMPT), Message::user(prompt)]
}

/// Previous visions of other categories, for cross-category consistency
pub fn previous_visions_message(
    category: &Category,
    previous: &[PreviousVision],
) -> Option<Message> {
    if previous.is_empty() {
        return None;
    }

    let context = previous
        .iter()
        .map(|pv| {
            let label = catalog()
                .resolve_category(&pv.category)
                .map(|c| c.label)
                .unwrap_or(pv.category.as_str());
            format!("{}: {}", label, pv.vision)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(Message::system(format!(
        "The user has already written visions for {} other categories. Keep the voice and \
         recurring themes consistent with them:\n\n{}\n\nNow writing: {}",
        previous.len(),
        context,
        category.label
    )))
}

/// Step 3: the vision itself
pub fn vision_messages(
    category: &Category,
    records: &[StepRecord],
    previous: &[PreviousVision],
) -> Vec<Message> {
    let mut broad: &[String] = &[];
    let mut custom_input = None;
    let mut drill_downs = None;
    let mut rhythm = None;

    for record in records {
        match record {
            StepRecord::Broad {
                selections,
                custom_input: custom,
            } => {
                broad = selections.as_slice();
                custom_input = custom.as_deref();
            }
            StepRecord::DrillDown { selections } => drill_downs = Some(selections),
            StepRecord::Rhythm { selection } => rhythm = Some(selection.as_str()),
        }
    }

    let mut prompt = format!(
        "Write the user's {} vision from their discovery answers.\n\nBroad choices: {}\n",
        category.label,
        describe_broad(category, broad)
    );
    if let Some(custom) = custom_input {
        prompt.push_str(&format!("Their own words: \"{}\"\n", custom));
    }
    if let Some(answers) = drill_downs {
        prompt.push_str(&format!(
            "Follow-up answers:\n{}\n",
            describe_drill_downs(category, broad, answers)
        ));
    }
    if let Some(selection) = rhythm {
        prompt.push_str(&format!(
            "How it shows up in their week: {}\n",
            describe_rhythm(selection)
        ));
    }
    prompt.push_str(
        "\nWrite 2-3 paragraphs in first person, present tense. Reuse their exact words \
         wherever you can. Return only the vision text.",
    );

    let mut messages = vec![Message::system(VIVA_SYSTEM_PROMPT)];
    if let Some(context) = previous_visions_message(category, previous) {
        messages.push(context);
    }
    messages.push(Message::user(prompt));
    messages
}
