use chrono::NaiveDate;

use crate::workflows::cases::domain::CaseId;

const FALLBACK_SLUG: &str = "benefit";
const MAX_SLUG_LEN: usize = 40;

fn transliterate(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "h",
        'ґ' => "g",
        'д' => "d",
        'е' => "e",
        'є' => "ye",
        'ж' => "zh",
        'з' => "z",
        'и' => "y",
        'і' => "i",
        'ї' => "yi",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ю' => "yu",
        'я' => "ya",
        'ы' => "y",
        'э' => "e",
        'ё' => "yo",
        'ъ' | 'ь' | '\'' | '’' | '`' => "",
        _ => return None,
    };
    Some(latin)
}

/// Lowercase ASCII slug for download names. Cyrillic is transliterated, every other run of
/// non `[a-z0-9]` characters collapses to one underscore.
pub fn slugify(text: &str) -> String {
    let mut latin = String::with_capacity(text.len());
    for ch in text.trim().chars().flat_map(char::to_lowercase) {
        match transliterate(ch) {
            Some(replacement) => latin.push_str(replacement),
            None => latin.push(ch),
        }
    }

    let mut slug = String::with_capacity(latin.len());
    let mut pending_separator = false;
    for ch in latin.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    slug.truncate(MAX_SLUG_LEN);
    slug
}

/// `application_<slug>_<date>.pdf`
pub fn application_file_name(benefit_title: &str, date: NaiveDate) -> String {
    format!("application_{}_{}.pdf", slugify(benefit_title), date.format("%Y-%m-%d"))
}

/// `application_case_<id>_<date>.pdf`
pub fn case_application_file_name(case_id: &CaseId, date: NaiveDate) -> String {
    format!("application_case_{}_{}.pdf", case_id, date.format("%Y-%m-%d"))
}
