//! MOBI locale codes.
//!
//! The MOBI header stores language as a combined integer: the low byte is
//! the primary language, the next byte the dialect. Dialect codes are the
//! Windows sublanguage identifiers shifted left by two.

/// Primary language code table, indexed by the low locale byte.
const LANGUAGES: &[(u8, &str)] = &[
    (1, "ar"),
    (2, "bg"),
    (3, "ca"),
    (4, "zh"),
    (5, "cs"),
    (6, "da"),
    (7, "de"),
    (8, "el"),
    (9, "en"),
    (10, "es"),
    (11, "fi"),
    (12, "fr"),
    (13, "he"),
    (14, "hu"),
    (15, "is"),
    (16, "it"),
    (17, "ja"),
    (18, "ko"),
    (19, "nl"),
    (20, "no"),
    (21, "pl"),
    (22, "pt"),
    (23, "rm"),
    (24, "ro"),
    (25, "ru"),
    (26, "hr"),
    (27, "sk"),
    (28, "sq"),
    (29, "sv"),
    (30, "th"),
    (31, "tr"),
    (32, "ur"),
    (33, "id"),
    (34, "uk"),
    (35, "be"),
    (36, "sl"),
    (37, "et"),
    (38, "lv"),
    (39, "lt"),
    (41, "fa"),
    (42, "vi"),
    (43, "hy"),
    (44, "az"),
    (45, "eu"),
    (47, "mk"),
    (48, "st"),
    (49, "ts"),
    (50, "tn"),
    (52, "xh"),
    (53, "zu"),
    (54, "af"),
    (55, "ka"),
    (56, "fo"),
    (57, "hi"),
    (58, "mt"),
    (59, "se"),
    (62, "ms"),
    (63, "kk"),
    (65, "sw"),
    (67, "uz"),
    (68, "tt"),
    (69, "bn"),
    (70, "pa"),
    (71, "gu"),
    (72, "or"),
    (73, "ta"),
    (74, "te"),
    (75, "kn"),
    (76, "ml"),
    (77, "as"),
    (78, "mr"),
    (79, "sa"),
    (82, "cy"),
    (83, "gl"),
    (87, "kok"),
    (97, "ne"),
];

/// Region variants for languages with multiple Mobi dialect codes, indexed
/// by the dialect byte shifted right by two.
fn region(lang: &str, index: u8) -> Option<&'static str> {
    let table: &[(u8, &str)] = match lang {
        "en" => &[
            (1, "US"),
            (2, "GB"),
            (3, "AU"),
            (4, "CA"),
            (5, "NZ"),
            (6, "IE"),
            (7, "ZA"),
            (8, "JM"),
            (10, "BZ"),
            (11, "TT"),
            (13, "ZW"),
            (14, "PH"),
        ],
        "fr" => &[(1, "FR"), (2, "BE"), (3, "CA"), (4, "CH"), (5, "LU"), (6, "MC")],
        "de" => &[(1, "DE"), (2, "CH"), (3, "AT"), (4, "LU"), (5, "LI")],
        "es" => &[
            (1, "ES"),
            (2, "MX"),
            (4, "GT"),
            (5, "CR"),
            (6, "PA"),
            (7, "DO"),
            (8, "VE"),
            (9, "CO"),
            (10, "PE"),
            (11, "AR"),
            (12, "EC"),
            (13, "CL"),
            (14, "UY"),
            (15, "PY"),
            (16, "BO"),
            (17, "SV"),
            (18, "HN"),
            (19, "NI"),
            (20, "PR"),
        ],
        "it" => &[(1, "IT"), (2, "CH")],
        "nl" => &[(1, "NL"), (2, "BE")],
        "pt" => &[(1, "BR"), (2, "PT")],
        "sv" => &[(1, "SE"), (2, "FI")],
        "zh" => &[(1, "TW"), (2, "CN"), (3, "HK"), (4, "SG")],
        "ru" => &[(1, "RU")],
        _ => return None,
    };
    table.iter().find(|&&(i, _)| i == index).map(|&(_, r)| r)
}

/// Map a MOBI locale number to an IETF-style language tag, e.g. `en-US`.
/// Returns `None` for unknown language codes.
pub fn locale_string(locale: u32) -> Option<String> {
    let lang_code = (locale & 0xFF) as u8;
    let dialect_code = ((locale >> 8) & 0xFF) as u8;
    let lang = LANGUAGES
        .iter()
        .find(|&&(code, _)| code == lang_code)
        .map(|&(_, tag)| tag)?;
    match region(lang, dialect_code >> 2) {
        Some(r) => Some(format!("{lang}-{r}")),
        None => Some(lang.to_string()),
    }
}
