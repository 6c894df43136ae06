//! Prompt builders for the text oracle.

use crate::workflows::cases::domain::{
    Benefit, Case, CaseDocument, CaseHistoryEntry, ClaimantProfile,
};

const RECENT_HISTORY: usize = 5;
const RANKED_CONTEXT: usize = 5;
const FALLBACK_CONTEXT: usize = 3;
const NONE: &str = "none";

fn or_none(value: Option<&str>) -> &str {
    value.filter(|text| !text.trim().is_empty()).unwrap_or(NONE)
}

/// Prompt for a standalone application letter in the tagged section format.
pub fn application_prompt(profile: &ClaimantProfile, benefit: &Benefit, extra_info: &str) -> String {
    format!(
        "You are a legal assistant. Draft an official application letter.\n\
         IMPORTANT: answer STRICTLY in the format below (with the markers) and nothing else.\n\n\
         FORMAT:\n\
         [TO]\n...\n[FROM]\n...\n[BODY]\n...\n[ATTACHMENTS]\n- ...\n- ...\n\n\
         Where:\n\
         - [TO] is the authority or institution (1-3 lines)\n\
         - [FROM] is the applicant: full name, email, region (1-3 lines)\n\
         - [BODY] is 2-6 paragraphs of formal text\n\
         - [ATTACHMENTS] lists the enclosed documents (0-5 items)\n\n\
         Input:\n\
         Applicant: {applicant}\n\
         Email: {email}\n\
         Region: {region}\n\
         Status: {status}\n\n\
         Benefit: {title}\n\
         Description: {description}\n\
         Authority: {authority}\n\
         Additional information from the applicant: {extra}\n\n\
         Do not invent specific documents that were not given. If needed, use general wording in [ATTACHMENTS].",
        applicant = profile.display_name(),
        email = profile.email,
        region = profile.region.as_deref().unwrap_or_default(),
        status = or_none(profile.status.as_deref()),
        title = benefit.title,
        description = benefit.description,
        authority = benefit.authority,
        extra = extra_info.trim(),
    )
}

/// Shorter prompt used when generating the application stored on a case.
pub fn case_application_prompt(profile: &ClaimantProfile, benefit: &Benefit) -> String {
    format!(
        "Draft an official application letter using the structure:\n\
         [TO]...\n[FROM]...\n[BODY]...\n[ATTACHMENTS]...\n\n\
         Applicant: {applicant}\n\
         Email: {email}\n\
         Status: {status}\n\
         Region: {region}\n\n\
         Benefit: {title}\n\
         Description: {description}\n\
         Authority: {authority}\n",
        applicant = profile.display_name(),
        email = profile.email,
        status = or_none(profile.status.as_deref()),
        region = profile.region.as_deref().unwrap_or_default(),
        title = benefit.title,
        description = benefit.description,
        authority = benefit.authority,
    )
}

/// Question about one case. `history` is newest first; only the latest entries are used.
pub fn case_question_prompt(
    profile: &ClaimantProfile,
    case: &Case,
    benefit: &Benefit,
    documents: &[CaseDocument],
    history: &[CaseHistoryEntry],
    question: &str,
) -> String {
    let documents = bullet_list(
        documents
            .iter()
            .map(|document| format!("- {}: {}", document.title, document.status)),
    );
    let history = bullet_list(history.iter().take(RECENT_HISTORY).map(|entry| {
        format!(
            "- {}: {} ({})",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.status,
            entry.comment
        )
    }));

    format!(
        "You are an assistant for veterans and their families.\n\
         Answer briefly, as a list of points.\n\
         Do not invent facts. If the data is insufficient, ask 1-2 clarifying questions.\n\n\
         User:\n- Status: {status}\n\n\
         Case:\n- ID: {case_id}\n- Status: {case_status}\n- Note: {note}\n\n\
         Benefit:\n- Title: {title}\n- Description: {description}\n- Authority: {authority}\n\n\
         Documents:\n{documents}\n\n\
         Recent changes:\n{history}\n\n\
         Question: {question}\n",
        status = or_none(profile.status.as_deref()),
        case_id = case.id,
        case_status = case.status,
        note = case.note,
        title = benefit.title,
        description = benefit.description,
        authority = benefit.authority,
        question = question.trim(),
    )
}

/// Question about the catalog as a whole, answered from the best matching benefits.
pub fn catalog_question_prompt(
    profile: &ClaimantProfile,
    context: &[&Benefit],
    question: &str,
) -> String {
    let context = context
        .iter()
        .map(|benefit| benefit_context(benefit))
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        "You advise veterans and their families on social guarantees.\n\
         Answer briefly and in a structured way.\n\
         Use ONLY the context below. If data is missing, ask for clarification.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\
         User status: {status}\n\
         Region: {region}\n",
        question = question.trim(),
        status = or_none(profile.status.as_deref()),
        region = profile.region.as_deref().unwrap_or_default(),
    )
}

pub fn benefit_context(benefit: &Benefit) -> String {
    let statuses = benefit.eligible_statuses();
    let documents: Vec<&str> = benefit
        .required_documents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    format!(
        "Title: {}\nCategory: {}\nDescription: {}\nAuthority: {}\nEligible: {}\nDocuments: {}\n",
        benefit.title,
        benefit.category,
        benefit.description,
        benefit.authority,
        join_or_none(&statuses),
        join_or_none(&documents),
    )
}

/// Keyword score: how many words of the question occur in the benefit's searchable text.
pub fn keyword_score(benefit: &Benefit, question: &str) -> usize {
    let haystack = format!(
        "{} {} {} {}",
        benefit.title, benefit.category, benefit.description, benefit.authority
    )
    .to_lowercase();

    question
        .to_lowercase()
        .split_whitespace()
        .filter(|word| haystack.contains(word))
        .count()
}

/// Top matches with a positive score, or the first few benefits when nothing matches.
/// Ties keep catalog order.
pub fn rank_benefits<'a>(benefits: &'a [Benefit], question: &str) -> Vec<&'a Benefit> {
    let mut scored: Vec<(usize, &Benefit)> = benefits
        .iter()
        .map(|benefit| (keyword_score(benefit, question), benefit))
        .collect();
    scored.sort_by(|left, right| right.0.cmp(&left.0));

    let matched: Vec<&Benefit> = scored
        .iter()
        .take(RANKED_CONTEXT)
        .filter(|(score, _)| *score > 0)
        .map(|(_, benefit)| *benefit)
        .collect();

    if matched.is_empty() {
        scored
            .into_iter()
            .take(FALLBACK_CONTEXT)
            .map(|(_, benefit)| benefit)
            .collect()
    } else {
        matched
    }
}

fn bullet_list(lines: impl Iterator<Item = String>) -> String {
    let joined = lines.collect::<Vec<_>>().join("\n");
    if joined.is_empty() {
        NONE.to_string()
    } else {
        joined
    }
}

fn join_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        NONE.to_string()
    } else {
        items.join(", ")
    }
}
