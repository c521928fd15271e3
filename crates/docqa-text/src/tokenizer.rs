use tantivy::tokenizer::{LowerCaser, RegexTokenizer, TextAnalyzer, TokenStream};

/// Words of at least two ASCII letters, digits or underscores.
pub const TOKEN_PATTERN: &str = r"[A-Za-z0-9_]{2,}";
/// Upper bound on tokens taken from one text.
pub const MAX_TOKENS: usize = 5000;

/// Lowercasing word tokenizer shared by indexing and querying.
#[derive(Clone)]
pub struct Tokenizer {
	analyzer: TextAnalyzer,
}

impl Tokenizer {
	pub fn new() -> anyhow::Result<Self> {
		let analyzer = TextAnalyzer::builder(RegexTokenizer::new(TOKEN_PATTERN)?)
			.filter(LowerCaser)
			.build();
		Ok(Self { analyzer })
	}

	/// Tokens in text order, truncated to [`MAX_TOKENS`].
	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		while tokens.len() < MAX_TOKENS && stream.advance() {
			tokens.push(stream.token().text.clone());
		}
		tokens
	}
}
