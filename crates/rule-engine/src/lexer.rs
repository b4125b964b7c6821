//! 规则文本分词
//!
//! 从左到右做不重叠匹配，优先级依次为：单个括号、关键字 `AND`/`OR`、
//! 由 `<`、`>`、`=` 组成的最长串、最长的单词字符串。
//! 不属于任何一类的字符直接跳过，不报错。

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(|\)|AND|OR|[<>=]+|\w+").expect("token pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    LParen,
    RParen,
    /// `AND` 或 `OR`
    Keyword,
    /// 比较符串，可能是 `>=` 这类多字符形式
    Comparator,
    /// 标识符或数字
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    fn classify(text: &'a str) -> Self {
        let kind = match text {
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "AND" | "OR" => TokenKind::Keyword,
            _ if text.starts_with(['<', '>', '=']) => TokenKind::Comparator,
            _ => TokenKind::Word,
        };
        Self { kind, text }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }
}

/// 将规则文本切分为 token 序列
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    TOKEN_PATTERN
        .find_iter(source)
        .map(|m| Token::classify(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        tokenize(source).iter().map(Token::as_str).collect()
    }

    #[test]
    fn test_tokenize_compound_rule() {
        assert_eq!(
            texts("(age > 30) AND (department = Sales)"),
            vec!["(", "age", ">", "30", ")", "AND", "(", "department", "=", "Sales", ")"]
        );
    }

    #[test]
    fn test_token_kinds() {
        let kinds: Vec<TokenKind> = tokenize("(a >= 1) OR b")
            .iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LParen,
                TokenKind::Word,
                TokenKind::Comparator,
                TokenKind::Word,
                TokenKind::RParen,
                TokenKind::Keyword,
                TokenKind::Word,
            ]
        );
    }

    #[test]
    fn test_stray_characters_are_skipped() {
        assert_eq!(texts("age! > 30; @#$"), vec!["age", ">", "30"]);
        assert_eq!(texts("salary > 1,000.50"), vec!["salary", ">", "1", "000", "50"]);
        assert!(tokenize("!@#$%^&*").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_comparator_runs_are_maximal() {
        assert_eq!(texts("a>=1"), vec!["a", ">=", "1"]);
        assert_eq!(texts("a <=> b"), vec!["a", "<=>", "b"]);
    }

    #[test]
    fn test_keyword_prefix_splits_words() {
        // 关键字优先于单词匹配
        assert_eq!(texts("ORDER = 1"), vec!["OR", "DER", "=", "1"]);
        assert_eq!(texts("ANDY = x"), vec!["AND", "Y", "=", "x"]);
        // 单词中间出现的关键字不会被拆开
        assert_eq!(texts("BRAND = x"), vec!["BRAND", "=", "x"]);
        // 关键字区分大小写
        assert_eq!(tokenize("a and b")[1].kind, TokenKind::Word);
    }

    #[test]
    fn test_unicode_word_characters() {
        assert_eq!(texts("城市 = 上海"), vec!["城市", "=", "上海"]);
    }
}
