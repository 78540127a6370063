//! Naming variant generation for cross-language symbol matching.
//!
//! A `UserService` class in TypeScript, a `user_service` function in Python,
//! and a `user_services` table in SQL are usually the same concept wearing
//! different conventions. This module generates the set of case, affix, and
//! pluralization variants of a symbol name so the trace engine and search can
//! bridge those boundaries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// Type prefixes commonly attached to interfaces/types/enums/base classes.
const COMMON_PREFIXES: &[&str] = &["I", "T", "E", "Base"];

/// Type suffixes commonly attached to data-transfer and layering classes.
const COMMON_SUFFIXES: &[&str] = &[
    "Dto",
    "Model",
    "Entity",
    "Service",
    "Repository",
    "Repo",
    "Controller",
    "Manager",
];

/// Irregular English plurals that the suffix rules cannot derive.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("child", "children"),
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
];

/// Upper bound on the memo cache; cleared wholesale when exceeded.
const VARIANT_CACHE_CAP: usize = 2048;

static VARIANT_CACHE: Mutex<Option<HashMap<String, BTreeMap<String, String>>>> = Mutex::new(None);

/// Split a symbol name into its component words.
///
/// Recognizes PascalCase boundaries, camelCase humps, acronym runs (the run
/// ends before a following lowercase letter), underscores, hyphens, dots, and
/// digit boundaries. Digits become their own tokens:
/// `OAuth2Client` -> `["OAuth", "2", "Client"]`.
pub fn parse_symbol_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for segment in name.split(['_', '-', '.']) {
        split_case_boundaries(segment, true, &mut words);
    }
    words
}

/// Word split used for case re-emission. Unlike [`parse_symbol_words`], digit
/// runs stay attached to the preceding word (`OAuth2Client` ->
/// `["O", "Auth2", "Client"]`), which is what the snake/camel/pascal forms of
/// mixed alphanumeric names need.
fn case_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for segment in name.split(['_', '-', '.']) {
        split_case_boundaries(segment, false, &mut words);
    }
    words
}

/// Core case-boundary scanner shared by both splitters.
///
/// `separate_digits` controls whether a digit run becomes its own word or is
/// folded into the word before it. Acronym runs split before their final
/// uppercase letter when followed by lowercase; the run must keep at least
/// two letters for the strict splitter (`HTTPServer` -> HTTP + Server, but
/// `OAuth` stays whole) and one for the emission splitter (`IUser` -> I +
/// User).
fn split_case_boundaries(segment: &str, separate_digits: bool, out: &mut Vec<String>) {
    let chars: Vec<char> = segment.chars().collect();
    if chars.is_empty() {
        return;
    }

    let min_acronym_remainder = if separate_digits { 2 } else { 1 };
    let mut current = String::new();
    let mut upper_run = 0usize;

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };

        let mut boundary = false;
        if let Some(p) = prev {
            if (p.is_lowercase() || p.is_ascii_digit()) && c.is_uppercase() {
                boundary = true;
            } else if separate_digits
                && ((p.is_alphabetic() && c.is_ascii_digit())
                    || (p.is_ascii_digit() && c.is_alphabetic()))
            {
                boundary = true;
            }
        }

        // Acronym run ending: ...HTTPServer -> split before the 'S'.
        if !boundary
            && c.is_lowercase()
            && upper_run > min_acronym_remainder
            && current.len() >= upper_run
        {
            let split_at = current.len() - 1;
            let tail = current.split_off(split_at);
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current = tail;
        }

        if boundary && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }

        upper_run = if c.is_uppercase() { upper_run + 1 } else { 0 };
        if boundary {
            upper_run = if c.is_uppercase() { 1 } else { 0 };
        }
        current.push(c);
    }

    if !current.is_empty() {
        out.push(current);
    }
}

/// Pluralize an English word. Already-plural input is returned unchanged.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();

    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular {
            return (*plural).to_string();
        }
        if lower == *plural {
            return word.to_string();
        }
    }

    // Already plural: trailing 's' that is not part of -ss/-us/-is.
    if lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return word.to_string();
    }

    if let Some(stem) = lower.strip_suffix('y') {
        let penultimate = stem.chars().last();
        if let Some(p) = penultimate {
            if !"aeiou".contains(p) {
                return format!("{stem}ies");
            }
        }
    }

    if lower.ends_with('s')
        || lower.ends_with("sh")
        || lower.ends_with("ch")
        || lower.ends_with('x')
        || lower.ends_with('z')
    {
        return format!("{lower}es");
    }

    format!("{lower}s")
}

/// Singularize an English word. Already-singular input is returned unchanged.
pub fn singularize(word: &str) -> String {
    let lower = word.to_lowercase();

    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *plural {
            return (*singular).to_string();
        }
        if lower == *singular {
            return word.to_string();
        }
    }

    if let Some(stem) = lower.strip_suffix("ies") {
        return format!("{stem}y");
    }

    if let Some(stem) = lower.strip_suffix("es") {
        if stem.ends_with('s')
            || stem.ends_with("sh")
            || stem.ends_with("ch")
            || stem.ends_with('x')
            || stem.ends_with('z')
        {
            return stem.to_string();
        }
    }

    if lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return lower[..lower.len() - 1].to_string();
    }

    word.to_string()
}

/// Strip known type prefixes, cascading: `IBaseUser` ->
/// `["IBaseUser", "BaseUser", "User"]`. A name that *is* a prefix is left
/// alone, and the remainder must itself start a new word.
pub fn strip_common_prefixes(name: &str) -> Vec<String> {
    let mut results = vec![name.to_string()];
    let mut current = name.to_string();

    loop {
        let words = case_words(&current);
        if words.len() < 2 {
            break;
        }
        let first = &words[0];
        if !COMMON_PREFIXES.contains(&first.as_str()) {
            break;
        }
        let stripped = current[first.len()..].to_string();
        if stripped.is_empty() {
            break;
        }
        results.push(stripped.clone());
        current = stripped;
    }

    results
}

/// Strip known type suffixes, cascading: `UserServiceManager` ->
/// `["UserServiceManager", "UserService", "User"]`. Comparison is
/// case-insensitive so `UserDTO` sheds `DTO`.
pub fn strip_common_suffixes(name: &str) -> Vec<String> {
    let mut results = vec![name.to_string()];
    let mut current = name.to_string();

    loop {
        let words = case_words(&current);
        if words.len() < 2 {
            break;
        }
        let last = &words[words.len() - 1];
        let last_lower = last.to_lowercase();
        if !COMMON_SUFFIXES.iter().any(|s| s.to_lowercase() == last_lower) {
            break;
        }
        let stripped = current[..current.len() - last.len()].to_string();
        if stripped.is_empty() {
            break;
        }
        results.push(stripped.clone());
        current = stripped;
    }

    results
}

fn join_snake(words: &[String]) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn join_kebab(words: &[String]) -> String {
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn join_pascal(words: &[String]) -> String {
    words.iter().map(|w| capitalize(w)).collect()
}

fn join_camel(words: &[String]) -> String {
    let mut out = String::new();
    for (i, w) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&w.to_lowercase());
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

/// Generate the full variant map for a symbol name.
///
/// Keys mirror the variant kind: `original`, `snake_case`, `camel_case`,
/// `pascal_case`, `kebab_case`, `screaming_snake`, `screaming_kebab`,
/// `plural_snake`, `plural_pascal`, `singular_snake`, `singular_pascal`, and
/// (when an affix was stripped) `without_prefix_snake` /
/// `without_prefix_pascal` / `without_suffix_snake` / `without_suffix_pascal`.
///
/// Output size is bounded regardless of input; results are memoized in a
/// size-capped cache.
pub fn generate_variants(name: &str) -> BTreeMap<String, String> {
    {
        let guard = VARIANT_CACHE.lock().unwrap();
        if let Some(cache) = guard.as_ref() {
            if let Some(hit) = cache.get(name) {
                return hit.clone();
            }
        }
    }

    let variants = compute_variants(name);

    let mut guard = VARIANT_CACHE.lock().unwrap();
    let cache = guard.get_or_insert_with(HashMap::new);
    if cache.len() >= VARIANT_CACHE_CAP {
        cache.clear();
    }
    cache.insert(name.to_string(), variants.clone());
    variants
}

fn compute_variants(name: &str) -> BTreeMap<String, String> {
    let mut variants = BTreeMap::new();
    variants.insert("original".to_string(), name.to_string());

    if name.is_empty() {
        return variants;
    }

    let words = case_words(name);
    if words.is_empty() {
        return variants;
    }

    variants.insert("snake_case".to_string(), join_snake(&words));
    variants.insert("camel_case".to_string(), join_camel(&words));
    variants.insert("pascal_case".to_string(), join_pascal(&words));
    variants.insert("kebab_case".to_string(), join_kebab(&words));
    variants.insert(
        "screaming_snake".to_string(),
        join_snake(&words).to_uppercase(),
    );
    variants.insert(
        "screaming_kebab".to_string(),
        join_kebab(&words).to_uppercase(),
    );

    // Pluralization of the last word, emitted in snake and pascal shapes.
    let mut plural_words = words.clone();
    if let Some(last) = plural_words.last_mut() {
        *last = pluralize(last);
    }
    variants.insert("plural_snake".to_string(), join_snake(&plural_words));
    variants.insert("plural_pascal".to_string(), join_pascal(&plural_words));

    let mut singular_words = words.clone();
    if let Some(last) = singular_words.last_mut() {
        *last = singularize(last);
    }
    variants.insert("singular_snake".to_string(), join_snake(&singular_words));
    variants.insert("singular_pascal".to_string(), join_pascal(&singular_words));

    let prefix_stripped = strip_common_prefixes(name);
    if prefix_stripped.len() > 1 {
        let stripped_words = case_words(&prefix_stripped[1]);
        variants.insert(
            "without_prefix_snake".to_string(),
            join_snake(&stripped_words),
        );
        variants.insert(
            "without_prefix_pascal".to_string(),
            join_pascal(&stripped_words),
        );
    }

    let suffix_stripped = strip_common_suffixes(name);
    if suffix_stripped.len() > 1 {
        let stripped_words = case_words(&suffix_stripped[1]);
        variants.insert(
            "without_suffix_snake".to_string(),
            join_snake(&stripped_words),
        );
        variants.insert(
            "without_suffix_pascal".to_string(),
            join_pascal(&stripped_words),
        );
    }

    variants
}

/// The set of distinct variant strings for a name (always contains the name).
pub fn variant_set(name: &str) -> BTreeSet<String> {
    generate_variants(name).into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_input_generates_all_variants() {
        let result = generate_variants("UserService");

        assert_eq!(result["original"], "UserService");
        assert_eq!(result["snake_case"], "user_service");
        assert_eq!(result["camel_case"], "userService");
        assert_eq!(result["pascal_case"], "UserService");
        assert_eq!(result["kebab_case"], "user-service");
        assert_eq!(result["screaming_snake"], "USER_SERVICE");
        assert_eq!(result["screaming_kebab"], "USER-SERVICE");
        assert_eq!(result["plural_snake"], "user_services");
        assert_eq!(result["plural_pascal"], "UserServices");
    }

    #[test]
    fn snake_case_input_generates_all_variants() {
        let result = generate_variants("user_service");

        assert_eq!(result["snake_case"], "user_service");
        assert_eq!(result["camel_case"], "userService");
        assert_eq!(result["pascal_case"], "UserService");
        assert_eq!(result["kebab_case"], "user-service");
        assert_eq!(result["screaming_snake"], "USER_SERVICE");
    }

    #[test]
    fn camel_and_kebab_and_screaming_inputs() {
        assert_eq!(generate_variants("userService")["snake_case"], "user_service");
        assert_eq!(generate_variants("user-service")["pascal_case"], "UserService");
        assert_eq!(generate_variants("USER_SERVICE")["camel_case"], "userService");
        assert_eq!(
            generate_variants("USER_SERVICE")["screaming_snake"],
            "USER_SERVICE"
        );
    }

    #[test]
    fn single_word_variants() {
        let result = generate_variants("user");
        assert_eq!(result["pascal_case"], "User");
        assert_eq!(result["plural_snake"], "users");
        assert_eq!(result["plural_pascal"], "Users");
    }

    #[test]
    fn interface_prefix_stripped() {
        let result = generate_variants("IUser");
        assert_eq!(result["snake_case"], "i_user");
        assert_eq!(result["pascal_case"], "IUser");
        assert_eq!(result["without_prefix_snake"], "user");
        assert_eq!(result["without_prefix_pascal"], "User");
    }

    #[test]
    fn dto_suffix_stripped() {
        let result = generate_variants("UserDto");
        assert_eq!(result["snake_case"], "user_dto");
        assert_eq!(result["without_suffix_snake"], "user");
        assert_eq!(result["without_suffix_pascal"], "User");
    }

    #[test]
    fn numbers_in_name() {
        let result = generate_variants("OAuth2Client");
        assert_eq!(result["original"], "OAuth2Client");
        assert_eq!(result["snake_case"], "o_auth2_client");
        assert_eq!(result["camel_case"], "oAuth2Client");
        assert_eq!(result["pascal_case"], "OAuth2Client");
    }

    #[test]
    fn acronyms_recognized() {
        let result = generate_variants("HTTPServer");
        assert_eq!(result["snake_case"], "http_server");
        assert_eq!(result["camel_case"], "httpServer");
    }

    #[test]
    fn sql_table_plural_singularized() {
        let result = generate_variants("users");
        assert_eq!(result["singular_snake"], "user");
        assert_eq!(result["singular_pascal"], "User");
    }

    #[test]
    fn parse_words_pascal_and_camel() {
        assert_eq!(parse_symbol_words("UserService"), vec!["User", "Service"]);
        assert_eq!(parse_symbol_words("User"), vec!["User"]);
        assert_eq!(parse_symbol_words("userService"), vec!["user", "Service"]);
        assert_eq!(
            parse_symbol_words("getUserById"),
            vec!["get", "User", "By", "Id"]
        );
    }

    #[test]
    fn parse_words_snake_and_kebab() {
        assert_eq!(parse_symbol_words("user_service"), vec!["user", "service"]);
        assert_eq!(
            parse_symbol_words("get_user_by_id"),
            vec!["get", "user", "by", "id"]
        );
        assert_eq!(parse_symbol_words("user-service"), vec!["user", "service"]);
        assert_eq!(parse_symbol_words("USER_SERVICE"), vec!["USER", "SERVICE"]);
    }

    #[test]
    fn parse_words_acronyms_and_numbers() {
        assert_eq!(parse_symbol_words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(parse_symbol_words("XMLParser"), vec!["XML", "Parser"]);
        assert_eq!(
            parse_symbol_words("OAuth2Client"),
            vec!["OAuth", "2", "Client"]
        );
        assert_eq!(
            parse_symbol_words("base64Encode"),
            vec!["base", "64", "Encode"]
        );
        assert_eq!(
            parse_symbol_words("getHTTP2Response"),
            vec!["get", "HTTP", "2", "Response"]
        );
    }

    #[test]
    fn parse_words_degenerate_inputs() {
        assert_eq!(parse_symbol_words(""), Vec::<String>::new());
        assert_eq!(parse_symbol_words("x"), vec!["x"]);
        assert_eq!(parse_symbol_words("X"), vec!["X"]);
    }

    #[test]
    fn prefix_stripping() {
        assert_eq!(strip_common_prefixes("IUser"), vec!["IUser", "User"]);
        assert_eq!(
            strip_common_prefixes("IUserService"),
            vec!["IUserService", "UserService"]
        );
        assert_eq!(strip_common_prefixes("TUser"), vec!["TUser", "User"]);
        assert_eq!(
            strip_common_prefixes("EUserStatus"),
            vec!["EUserStatus", "UserStatus"]
        );
        assert_eq!(
            strip_common_prefixes("BaseService"),
            vec!["BaseService", "Service"]
        );
        assert_eq!(strip_common_prefixes("User"), vec!["User"]);
        // "If" and "It" are words, not I-prefixed identifiers.
        assert_eq!(strip_common_prefixes("If"), vec!["If"]);
        assert_eq!(strip_common_prefixes("It"), vec!["It"]);
    }

    #[test]
    fn cascaded_prefix_stripping() {
        let result = strip_common_prefixes("IBaseUser");
        assert!(result.contains(&"IBaseUser".to_string()));
        assert!(result.contains(&"BaseUser".to_string()));
        assert!(result.contains(&"User".to_string()));
    }

    #[test]
    fn suffix_stripping() {
        assert_eq!(strip_common_suffixes("UserDto"), vec!["UserDto", "User"]);
        assert_eq!(strip_common_suffixes("UserDTO"), vec!["UserDTO", "User"]);
        assert_eq!(strip_common_suffixes("UserModel"), vec!["UserModel", "User"]);
        assert_eq!(strip_common_suffixes("UserRepo"), vec!["UserRepo", "User"]);
        assert_eq!(strip_common_suffixes("User"), vec!["User"]);
        // A name that IS a suffix must not vanish.
        assert_eq!(strip_common_suffixes("Service"), vec!["Service"]);
        assert_eq!(strip_common_suffixes("Model"), vec!["Model"]);
    }

    #[test]
    fn cascaded_suffix_stripping() {
        let result = strip_common_suffixes("UserServiceManager");
        assert!(result.contains(&"UserServiceManager".to_string()));
        assert!(result.contains(&"UserService".to_string()));
        assert!(result.contains(&"User".to_string()));
    }

    #[test]
    fn pluralization_rules() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(pluralize("class"), "classes");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("match"), "matches");
        assert_eq!(pluralize("dish"), "dishes");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("key"), "keys");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("mouse"), "mice");
        // Already plural is left alone.
        assert_eq!(pluralize("users"), "users");
        assert_eq!(pluralize("children"), "children");
    }

    #[test]
    fn singularization_rules() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("statuses"), "status");
        assert_eq!(singularize("classes"), "class");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("children"), "child");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("mice"), "mouse");
        assert_eq!(singularize("user"), "user");
        // "status" ends in 's' but is not plural.
        assert_eq!(singularize("status"), "status");
    }

    #[test]
    fn variant_set_contains_original() {
        for name in ["UserService", "user_service", "IUser", "users", "x"] {
            assert!(variant_set(name).contains(name));
        }
    }

    #[test]
    fn cross_language_matching_chains() {
        // TypeScript IUser -> Python user
        let ts = generate_variants("IUser");
        let py = generate_variants("user");
        assert_eq!(ts["without_prefix_snake"], py["snake_case"]);

        // TypeScript UserService -> Python user_service
        let ts = generate_variants("UserService");
        let py = generate_variants("user_service");
        assert_eq!(ts["snake_case"], py["snake_case"]);

        // Python User model -> SQL users table
        let py = generate_variants("User");
        let sql = generate_variants("users");
        assert_eq!(py["plural_snake"], sql["snake_case"]);

        // C# UserDto -> TypeScript User
        let cs = generate_variants("UserDto");
        let ts = generate_variants("User");
        assert_eq!(cs["without_suffix_pascal"], ts["pascal_case"]);

        // Equivalent names under stripping share variants.
        let a = variant_set("IUserService");
        let b = variant_set("user_service");
        assert!(!a.is_disjoint(&b));
    }
}
