use anyhow::Result;
use std::collections::HashMap;
use std::fs;

use crate::scanner::token::TokenKind;

/// Loads the keyword spelling table. The optional JSON file maps canonical
/// keyword ids to surface spellings, so a course can localise the keyword
/// set without touching the scanner. Spellings match case-insensitively.
pub fn load_keywords(path: Option<&str>) -> Result<HashMap<String, TokenKind>> {
    let map: HashMap<String, String> = match path {
        Some(p) => {
            let contents = fs::read_to_string(p)?;
            serde_json::from_str(&contents)?
        }
        None => default_spellings(),
    };

    let mut keywords = HashMap::new();
    for (key, spelling) in map {
        if let Some(kind) = keyword_kind(&key) {
            keywords.insert(spelling.to_ascii_lowercase(), kind);
        }
    }

    Ok(keywords)
}

/// The canonical English keyword set.
pub fn default_keywords() -> HashMap<String, TokenKind> {
    default_spellings()
        .into_iter()
        .filter_map(|(key, spelling)| keyword_kind(&key).map(|kind| (spelling, kind)))
        .collect()
}

fn default_spellings() -> HashMap<String, String> {
    HashMap::from([
        ("algorithm".into(), "algorithm".into()),
        ("begin".into(), "begin".into()),
        ("end".into(), "end".into()),
        ("var".into(), "var".into()),
        ("const".into(), "const".into()),
        ("if".into(), "if".into()),
        ("then".into(), "then".into()),
        ("else".into(), "else".into()),
        ("endif".into(), "endif".into()),
        ("for".into(), "for".into()),
        ("to".into(), "to".into()),
        ("step".into(), "step".into()),
        ("do".into(), "do".into()),
        ("endfor".into(), "endfor".into()),
        ("while".into(), "while".into()),
        ("endwhile".into(), "endwhile".into()),
        ("read".into(), "read".into()),
        ("write".into(), "write".into()),
        ("function".into(), "function".into()),
        ("endfunction".into(), "endfunction".into()),
        ("procedure".into(), "procedure".into()),
        ("endprocedure".into(), "endprocedure".into()),
        ("return".into(), "return".into()),
        ("integer".into(), "integer".into()),
        ("real".into(), "real".into()),
        ("boolean".into(), "boolean".into()),
        ("string".into(), "string".into()),
        ("char".into(), "char".into()),
        ("mod".into(), "mod".into()),
        ("div".into(), "div".into()),
        ("and".into(), "and".into()),
        ("or".into(), "or".into()),
        ("not".into(), "not".into()),
    ])
}

fn keyword_kind(s: &str) -> Option<TokenKind> {
    match s {
        "algorithm" => Some(TokenKind::Algorithm),
        "begin" => Some(TokenKind::Begin),
        "end" => Some(TokenKind::End),
        "var" => Some(TokenKind::Var),
        "const" => Some(TokenKind::Const),
        "if" => Some(TokenKind::If),
        "then" => Some(TokenKind::Then),
        "else" => Some(TokenKind::Else),
        "endif" => Some(TokenKind::EndIf),
        "for" => Some(TokenKind::For),
        "to" => Some(TokenKind::To),
        "step" => Some(TokenKind::Step),
        "do" => Some(TokenKind::Do),
        "endfor" => Some(TokenKind::EndFor),
        "while" => Some(TokenKind::While),
        "endwhile" => Some(TokenKind::EndWhile),
        "read" => Some(TokenKind::Read),
        "write" => Some(TokenKind::Write),
        "function" => Some(TokenKind::Function),
        "endfunction" => Some(TokenKind::EndFunction),
        "procedure" => Some(TokenKind::Procedure),
        "endprocedure" => Some(TokenKind::EndProcedure),
        "return" => Some(TokenKind::Return),
        "integer" => Some(TokenKind::Integer),
        "real" => Some(TokenKind::Real),
        "boolean" => Some(TokenKind::Boolean),
        "string" => Some(TokenKind::String),
        "char" => Some(TokenKind::Char),
        "mod" => Some(TokenKind::Mod),
        "div" => Some(TokenKind::Div),
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "not" => Some(TokenKind::Not),
        _ => None,
    }
}
