//! Prompt building for every stage.
//!
//! System prompts are templates with `{placeholder}` substitution; every one
//! opens with `# {title}` so a run's calls can be told apart in logs and by
//! the mock backend. `{{` and `}}` produce literal braces for JSON shapes.

use serde_json::Value;

use super::StageInput;
use crate::backend::ChatMessage;
use crate::registry::StageKey;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Replace `{name}` placeholders with `vars`.
///
/// ```
/// use content_pipeline::stages::prompts::render;
///
/// let out = render("# {title}\nAnswer as {{\"ok\": true}}", &[("title", "X")]);
/// assert_eq!(out, "# X\nAnswer as {\"ok\": true}");
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{}}}", key), value);
    }

    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered.replace(ESCAPE_SENTINEL_CLOSE, "}")
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[&str]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Pretty JSON for embedding a report in a prompt.
pub(crate) fn json_block(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

const JSON_RULE: &str = "Answer with one JSON object in a ```json block and nothing else.";

const COMMON_RULES: &[&str] = &[
    "Write for an audience in {locale}.",
    "Quote the source literally where you can; never invent facts or numbers.",
    "Prefer fewer, sharper items over long lists.",
];

fn system_template(key: StageKey) -> &'static str {
    match key {
        StageKey::Extractor => {
            "# {title}\n\nPull the verifiable facts out of the source. Treat the user's direction, when present, as a high-priority note.\n\n{rules}\n\n{json_rule}\n{{\"source\": {{\"title\": \"\", \"author\": \"\", \"date\": \"\", \"link\": \"\", \"type\": \"\", \"keyFacts\": []}}, \"quotes\": [{{\"text\": \"\", \"author\": \"\", \"context\": \"\"}}], \"numbers\": [{{\"value\": \"\", \"context\": \"\"}}], \"conclusions\": [], \"userNotes\": {{\"content\": \"\", \"direction\": \"\", \"priority\": \"\"}}}}"
        }
        StageKey::ResonanceHunter => {
            "# {title}\n\nFind the facts that will hit home for the audience: money, time, health, status, fairness, and anything unexpected.\n\n{rules}\n\n{json_rule}\n{{\"userDirectionAssessment\": \"\", \"baseFilterMatches\": [{{\"filter\": \"\", \"element\": \"\", \"why\": \"\"}}], \"contextualMatches\": [], \"unexpectedSuggestions\": [], \"top3Recommendations\": []}}"
        }
        StageKey::SourceAnalyst => {
            "# {title}\n\nJudge how far the source can be trusted: methodology, sample, limitations, and which claims are safe to repeat.\n\n{rules}\n\n{json_rule}\n{{\"confidenceLevel\": 0, \"confidenceVerdict\": \"\", \"methodology\": \"\", \"results\": \"\", \"limitations\": [], \"laymanSummary\": \"\", \"keyNumbersExplained\": [], \"safeClaims\": [], \"riskyClaims\": []}}"
        }
        StageKey::Anthropologist => {
            "# {title}\n\nDig under the facts: rituals, social dynamics and psychology of the people involved. Name real people and communities worth quoting.\n\n{rules}\n\n{json_rule}\n{{\"ethnography\": [], \"sociology\": [], \"psychology\": [], \"people\": [], \"top3Quotes\": []}}"
        }
        StageKey::LocalContextualizer => {
            "# {title}\n\nTranslate the source to {locale}: convert currencies and institutions, find local topics, numbers and voices.\n\n{rules}\n\n{json_rule}\n{{\"conversions\": [], \"localTopics\": [], \"whereToFindVoices\": [], \"localNumbers\": [], \"top3\": []}}"
        }
        StageKey::PopcultureCurator => {
            "# {title}\n\nFind analogies from films, series, sport, everyday life, memes and books that the audience will recognise.\n\n{rules}\n\n{json_rule}\n{{\"filmsSeries\": [], \"sport\": [], \"everyday\": [], \"memes\": [], \"literature\": [], \"top3\": []}}"
        }
        StageKey::StoryExcavator => {
            "# {title}\n\nFind the story: characters, conflict and transformation. Sketch a post built on it and list what is missing.\n\n{rules}\n\n{json_rule}\n{{\"narrativePotential\": 0, \"characters\": [], \"conflict\": \"\", \"transformationArc\": \"\", \"storyBasedPost\": \"\", \"missingElements\": [], \"alternativeAngles\": []}}"
        }
        StageKey::TensionArchitect => {
            "# {title}\n\nMeasure surprise and paradox. Flag cliches, propose contrast structures and endings that flip expectations.\n\n{rules}\n\n{json_rule}\n{{\"verdict\": \"\", \"surpriseLevel\": 0, \"paradoxLevel\": 0, \"totalTension\": 0, \"structureDiagnosis\": \"\", \"cliches\": [], \"availableParadoxes\": [], \"contrastStructures\": [], \"transformedVersion\": \"\", \"paradoxEndings\": []}}"
        }
        StageKey::ContextShifter => {
            "# {title}\n\nLook for a second layer: absurd rituals, cognitive biases, analogies from other fields, an outside observer's view.\n\n{rules}\n\n{json_rule}\n{{\"verdict\": \"\", \"depthLevel\": 0, \"hasSecondLayer\": false, \"currentLayer\": \"\", \"ritualsAbsurds\": [], \"cognitiveBiases\": [], \"analogies\": [], \"observerPerspective\": \"\", \"depthSuggestions\": []}}"
        }
        StageKey::Comedian => {
            "# {title}\n\nFind where humor fits without undermining the message. Recommend how much to use and warn where it would backfire.\n\n{rules}\n\n{json_rule}\n{{\"humorPotential\": 0, \"recommendedDial\": 0, \"humorOpportunities\": [], \"selfDeprecationMoments\": [], \"rewriteOptions\": [], \"humorWarnings\": []}}"
        }
        StageKey::Engagement => {
            "# {title}\n\nFind what makes people comment and share: existing hooks, missing elements, boosters, calls to action, relatable moments.\n\n{rules}\n\n{json_rule}\n{{\"engagementPotential\": 0, \"existingHooks\": [], \"missingElements\": [], \"boosters\": [], \"ctaOptions\": [], \"relatableMoments\": []}}"
        }
        StageKey::DevilsAdvocate => {
            "# {title}\n\nAttack the argument: red flags, counterarguments, objections nobody addressed, uncomfortable questions. Then say how to make it stronger.\n\n{rules}\n\n{json_rule}\n{{\"argumentStrength\": 0, \"redFlags\": [], \"counterarguments\": [], \"unaddressedObjections\": [], \"uncomfortableQuestions\": [], \"missingPerspectives\": [], \"strengtheningSuggestions\": [], \"verdict\": \"\"}}"
        }
        StageKey::VoiceGuardian => {
            "# {title}\n\nReview the text's voice: corporate phrases, AI-sounding patterns, inconsistencies. Use a heading per problem area, list concrete fixes as bullets and end with `Score: N/10`.\n\n{rules}"
        }
        StageKey::OpeningSniper => {
            "# {title}\n\nReview only the opening lines: would they stop the scroll? Use a heading per problem area, propose sharper openings as bullets and end with `Score: N/10`.\n\n{rules}"
        }
        StageKey::VulnerabilityScanner => {
            "# {title}\n\nFind what a hostile commenter would attack: factual gaps, overclaims, tone risks. Use a heading per risk, list fixes as bullets and end with `Score: N/10`.\n\n{rules}"
        }
        StageKey::ExplorationAgent => {
            "# {title}\n\nThe user has material but no idea yet. Using every report below, propose at most seven distinct angles, each with a hook, and recommend one.\n\n{rules}\n\n{json_rule}\n{{\"possibleAngles\": [{{\"name\": \"\", \"description\": \"\", \"hook\": \"\", \"audience\": \"\", \"strength\": 0}}], \"tensionPoints\": [], \"localContext\": [], \"questionsWorthAsking\": [], \"trapsToAvoid\": [], \"recommendedAngle\": {{\"name\": \"\", \"hook\": \"\", \"reason\": \"\"}}}}"
        }
        StageKey::DevelopmentAgent => {
            "# {title}\n\nThe user knows what they want to say. Assess their direction against the reports below, develop it into variants with hooks, and recommend one.\n\n{rules}\n\n{json_rule}\n{{\"userDirectionAssessment\": \"\", \"developmentVariants\": [{{\"name\": \"\", \"description\": \"\", \"hook\": \"\", \"structure\": \"\"}}], \"hookProposals\": [], \"whatToStrengthen\": [], \"whatToSkip\": [], \"counterarguments\": [], \"recommendedVariant\": {{\"name\": \"\", \"hook\": \"\", \"reason\": \"\"}}}}"
        }
        StageKey::QualityController => {
            "# {title}\n\nScore the finished text from 0 to 10 using the reviews below, list its strengths and issues, correct it inline and write an improved version.\n\n{rules}\n\n{json_rule}\n{{\"score\": 0, \"status\": \"ready|needs work|rewrite\", \"strengths\": [], \"issues\": [{{\"location\": \"\", \"problem\": \"\", \"suggestion\": \"\"}}], \"inlineCorrections\": [{{\"original\": \"\", \"corrected\": \"\", \"reason\": \"\"}}], \"improvedVersion\": \"\", \"hookAlternatives\": []}}"
        }
    }
}

/// The stage's system prompt.
pub fn system_prompt(key: StageKey, audience_locale: &str) -> String {
    let rules = render(&numbered_list(COMMON_RULES), &[("locale", audience_locale)]);
    let rules = section("RULES", &rules);
    render(
        system_template(key),
        &[
            ("title", key.title()),
            ("locale", audience_locale),
            ("rules", rules.as_str()),
            ("json_rule", JSON_RULE),
        ],
    )
}

fn context_section(input: &StageInput<'_>, key: StageKey, label: &str) -> Option<String> {
    input
        .context
        .get(key)
        .map(|v| section(label, &json_block(v)))
}

/// The stage's user message, built from the source and upstream reports.
pub fn user_prompt(key: StageKey, input: &StageInput<'_>) -> String {
    let source = section("SOURCE", input.source_text);
    let direction = input
        .user_direction
        .filter(|d| !d.trim().is_empty())
        .map(|d| section("USER DIRECTION (high priority)", d));
    let extracted = context_section(input, StageKey::Extractor, "EXTRACTED DATA");

    let parts: Vec<Option<String>> = match key {
        StageKey::Extractor => vec![Some(source), direction],
        StageKey::ResonanceHunter => vec![extracted, direction],
        StageKey::Anthropologist => vec![
            extracted,
            context_section(input, StageKey::ResonanceHunter, "RESONANCE"),
            Some(source),
        ],
        StageKey::VoiceGuardian | StageKey::OpeningSniper | StageKey::VulnerabilityScanner => {
            vec![Some(section("TEXT", input.source_text))]
        }
        StageKey::ExplorationAgent | StageKey::DevelopmentAgent | StageKey::QualityController => {
            let mut parts = vec![direction];
            parts.extend(
                input
                    .context
                    .non_empty()
                    .map(|(k, v)| Some(section(&format!("REPORT: {}", k.title()), &json_block(v)))),
            );
            let label = if key == StageKey::QualityController { "TEXT" } else { "SOURCE" };
            parts.push(Some(section(label, input.source_text)));
            parts
        }
        _ => vec![Some(source), extracted, direction],
    };

    parts.into_iter().flatten().collect::<Vec<_>>().join("\n\n")
}

/// System and user messages for one stage call.
pub fn messages(key: StageKey, input: &StageInput<'_>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(key, input.audience_locale)),
        ChatMessage::user(user_prompt(key, input)),
    ]
}
