use whatlang::Lang;

/// Maps a detection onto the two-letter codes the translation collaborator
/// speaks. Unlisted languages fall back to the ISO 639-3 code.
pub fn detect_code(text: &str) -> Option<&'static str> {
	let info = whatlang::detect(text)?;

	Some(match info.lang() {
		Lang::Kor => "ko",
		Lang::Eng => "en",
		Lang::Jpn => "ja",
		Lang::Cmn => "zh",
		other => other.code(),
	})
}

pub fn is_language(text: &str, code: &str) -> bool {
	detect_code(text).map(|detected| detected.eq_ignore_ascii_case(code)).unwrap_or(false)
}
