use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having","i","me","my","we","our",
];

/// Lower-cased alphanumeric tokens, optionally with stop words removed.
pub fn build_analyzer(stop_words: bool) -> TextAnalyzer {
	if stop_words {
		TextAnalyzer::builder(SimpleTokenizer::default())
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build()
	} else {
		TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build()
	}
}

pub fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
	// token_stream needs exclusive access; analyzers are cheap to clone.
	let mut analyzer = analyzer.clone();
	let mut stream = analyzer.token_stream(text);
	let mut tokens = Vec::new();
	while stream.advance() {
		tokens.push(stream.token().text.clone());
	}
	tokens
}
