//! Permissive literal parser
//!
//! Model output frequently embeds arrays in a language-literal style rather
//! than strict JSON: single-quoted strings, trailing commas, `True`/`False`/
//! `None`, tuples. This parser accepts that superset (strict JSON included)
//! and produces a `serde_json::Value`. Anything it cannot make sense of
//! yields `None`.

use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;

/// Parse `text` as a relaxed literal. The whole input must be consumed.
pub fn parse(text: &str) -> Option<Value> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let value = parser.value(0)?;
    parser.skip_whitespace();
    if parser.pos == parser.chars.len() {
        Some(value)
    } else {
        None
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self, depth: usize) -> Option<Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.skip_whitespace();
        match self.peek()? {
            '[' => self.sequence(depth, ']'),
            '(' => self.sequence(depth, ')'),
            '{' => self.mapping(depth),
            '"' | '\'' => self.string().map(Value::String),
            c if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() => self.word(),
            _ => None,
        }
    }

    fn sequence(&mut self, depth: usize, close: char) -> Option<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.eat(close) {
                return Some(Value::Array(items));
            }
            items.push(self.value(depth + 1)?);
            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            self.skip_whitespace();
            return if self.eat(close) {
                Some(Value::Array(items))
            } else {
                None
            };
        }
    }

    fn mapping(&mut self, depth: usize) -> Option<Value> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.eat('}') {
                return Some(Value::Object(map));
            }
            let key = match self.value(depth + 1)? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            self.skip_whitespace();
            if !self.eat(':') {
                return None;
            }
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            self.skip_whitespace();
            if self.eat(',') {
                continue;
            }
            self.skip_whitespace();
            return if self.eat('}') {
                Some(Value::Object(map))
            } else {
                None
            };
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => out.push(self.escape()?),
                '\n' => return None,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self) -> Option<char> {
        let ch = match self.bump()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '0' => '\0',
            'u' => return self.unicode_escape(),
            'x' => return char::from_u32(self.hex_digits(2)?),
            other => other,
        };
        Some(ch)
    }

    fn hex_digits(&mut self, len: usize) -> Option<u32> {
        let end = self.pos.checked_add(len)?;
        let digits = self.chars.get(self.pos..end)?;
        if !digits.iter().all(char::is_ascii_hexdigit) {
            return None;
        }
        self.pos = end;
        u32::from_str_radix(&digits.iter().collect::<String>(), 16).ok()
    }

    /// `\uXXXX`, joining a UTF-16 surrogate pair. A lone surrogate is invalid.
    fn unicode_escape(&mut self) -> Option<char> {
        let high = self.hex_digits(4)?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high);
        }
        if !(self.eat('\\') && self.eat('u')) {
            return None;
        }
        let low = self.hex_digits(4)?;
        if !(0xDC00..0xE000).contains(&low) {
            return None;
        }
        char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let raw = raw.strip_prefix('+').unwrap_or(&raw);

        if let Ok(int) = raw.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
        if let Ok(big) = raw.parse::<u64>() {
            return Some(Value::Number(big.into()));
        }
        let float = raw.parse::<f64>().ok()?;
        Number::from_f64(float).map(Value::Number)
    }

    fn word(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" | "True" => Some(Value::Bool(true)),
            "false" | "False" => Some(Value::Bool(false)),
            "null" | "None" => Some(Value::Null),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_strict_json_is_accepted() {
        let text = r#"[{"instruction": "MOV A,B", "risk_level": "Low", "n": -1.5}]"#;
        assert_eq!(
            parse(text),
            Some(json!([{"instruction": "MOV A,B", "risk_level": "Low", "n": -1.5}]))
        );
    }

    #[test]
    fn test_single_quotes_and_trailing_commas() {
        let text = "[\n  {'instruction': 'L DB10.DBW4', 'insight': \"it's a load\", 'risk_level': 'High',},\n]";
        assert_eq!(
            parse(text),
            Some(json!([{"instruction": "L DB10.DBW4", "insight": "it's a load", "risk_level": "High"}]))
        );
    }

    #[test]
    fn test_literal_keywords_and_tuples() {
        assert_eq!(
            parse("(True, False, None, 3)"),
            Some(json!([true, false, null, 3]))
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(parse(r"'a\'b\nA'"), Some(json!("a'b\nA")));
        assert_eq!(parse(r"'\x41\u00e9'"), Some(json!("A\u{e9}")));
    }

    #[test]
    fn test_surrogate_pairs() {
        assert_eq!(parse(r#""\ud83d\ude00""#), Some(json!("\u{1F600}")));
        assert_eq!(parse(r#"["\ud83d"]"#), None);
        assert_eq!(parse(r#""\ude00""#), None);
        assert_eq!(parse(r#""\ud83d\u0041""#), None);
        assert_eq!(parse(r#""\uZZZZ""#), None);
    }

    #[test]
    fn test_large_integers_stay_exact() {
        assert_eq!(parse("[18446744073709551615]"), Some(json!([u64::MAX])));
        assert_eq!(parse("[-9223372036854775808]"), Some(json!([i64::MIN])));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse("[1, 2"), None);
        assert_eq!(parse("[1 2]"), None);
        assert_eq!(parse("[undefined]"), None);
        assert_eq!(parse("[1] trailing"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_depth_is_bounded() {
        let deep = format!("{}{}", "[".repeat(500), "]".repeat(500));
        assert_eq!(parse(&deep), None);
    }
}
