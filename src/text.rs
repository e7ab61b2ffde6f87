//! ASCII folding shared by the fetcher, the page classifier and the normalizer.

use deunicode::deunicode_with_tofu;

/// Transliterates accented characters to their closest ASCII form, keeping case.
/// Characters with no ASCII form are dropped.
pub fn fold(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    deunicode_with_tofu(s, "")
}

/// `"Preço Fábrica (R$)"` -> `"preco_fabrica_r"`.
pub fn column_name(s: &str) -> String {
    fold(s)
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// `"Ácido Fólico"` -> `"ACIDO FOLICO"`.
pub fn cell_value(s: &str) -> String {
    fold(s).to_uppercase()
}
