//! Language tag normalization to the RFC 5646 forms supported by the platform.

pub const EN_US: &str = "en-US";
pub const ZH_CN: &str = "zh-CN";

/// Maps the many spellings clients send (`EN_US`, `en`, `zh_cn`, `zh-CN,zh;q=0.9`, ...)
/// onto a supported tag. Anything unrecognized becomes [`EN_US`].
pub fn normalize_language(lang: &str) -> &'static str {
    let primary = lang.split([',', ';']).next().unwrap_or_default().trim();

    match primary.to_ascii_lowercase().replace('_', "-").as_str() {
        "en-us" | "en" | "enus" => EN_US,
        "zh-cn" | "zh" | "zhcn" => ZH_CN,
        _ => EN_US,
    }
}
