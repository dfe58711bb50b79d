/// Available commands, autocomplete, and line parsing
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "list",
    aliases: &["l", "ls"],
    usage: "list [page=N] [limit=N] [field=value ...]",
    description: "Show a page of records and keep watching it",
  },
  Command {
    name: "create",
    aliases: &["c", "new"],
    usage: "create {json}",
    description: "Create a record",
  },
  Command {
    name: "update",
    aliases: &["u", "edit"],
    usage: "update <id> {json}",
    description: "Update fields of a record",
  },
  Command {
    name: "delete",
    aliases: &["d", "rm"],
    usage: "delete <id>",
    description: "Delete a record",
  },
  Command {
    name: "import",
    aliases: &["bulk"],
    usage: "import [{json}, ...]",
    description: "Create many records at once",
  },
  Command {
    name: "invalidate",
    aliases: &["refresh", "r"],
    usage: "invalidate",
    description: "Mark every cached page stale and refetch watched ones",
  },
  Command {
    name: "stats",
    aliases: &["st"],
    usage: "stats",
    description: "Show cache statistics",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit listcache",
  },
];

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  List {
    page: u32,
    limit: u32,
    filters: Vec<(String, Value)>,
  },
  Create(Value),
  Update { id: String, record: Value },
  Delete(String),
  Import(Vec<Value>),
  Invalidate,
  Stats,
  Help,
  Quit,
}

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Action>, String> {
  let line = line.trim();
  let Some(word) = line.split_whitespace().next() else {
    return Ok(None);
  };
  let rest = line[word.len()..].trim();
  let word = word.to_lowercase();

  // A bare prefix must name exactly one command.
  let suggestions = get_suggestions(&word);
  let cmd = match suggestions.first() {
    Some(cmd) if cmd.name == word || cmd.aliases.contains(&word.as_str()) => cmd,
    Some(cmd) if suggestions.len() == 1 => cmd,
    _ => return Err(format!("Unknown command '{}'. Type 'help' for a list.", word)),
  };

  let action = match cmd.name {
    "list" => parse_list(rest)?,
    "create" => Action::Create(parse_json(rest, cmd)?),
    "update" => {
      let (id, json) = split_id(rest, cmd)?;
      Action::Update {
        id,
        record: parse_json(json, cmd)?,
      }
    }
    "delete" => {
      let (id, extra) = split_id(rest, cmd)?;
      if !extra.is_empty() {
        return Err(format!("Usage: {}", cmd.usage));
      }
      Action::Delete(id)
    }
    "import" => match parse_json(rest, cmd)? {
      Value::Array(records) => Action::Import(records),
      _ => return Err("import expects a JSON array of records".to_string()),
    },
    "invalidate" => Action::Invalidate,
    "stats" => Action::Stats,
    "help" => Action::Help,
    _ => Action::Quit,
  };

  Ok(Some(action))
}

fn parse_list(rest: &str) -> Result<Action, String> {
  let mut page = DEFAULT_PAGE;
  let mut limit = DEFAULT_LIMIT;
  let mut filters = Vec::new();

  for arg in rest.split_whitespace() {
    let (name, value) = arg
      .split_once('=')
      .ok_or_else(|| format!("Expected name=value, got '{}'", arg))?;
    if name.is_empty() {
      return Err(format!("Missing filter name in '{}'", arg));
    }

    match name {
      "page" => page = parse_number(name, value)?,
      "limit" => limit = parse_number(name, value)?,
      _ => filters.push((name.to_string(), parse_value(value))),
    }
  }

  Ok(Action::List {
    page,
    limit,
    filters,
  })
}

fn parse_number(name: &str, value: &str) -> Result<u32, String> {
  match value.parse::<u32>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(format!("{} must be a positive integer, got '{}'", name, value)),
  }
}

/// `true`, `10`, `null` and quoted strings keep their JSON type; anything
/// else is a plain string.
fn parse_value(value: &str) -> Value {
  serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn parse_json(text: &str, cmd: &Command) -> Result<Value, String> {
  if text.is_empty() {
    return Err(format!("Usage: {}", cmd.usage));
  }
  serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))
}

fn split_id<'a>(rest: &'a str, cmd: &Command) -> Result<(String, &'a str), String> {
  match rest.split_once(char::is_whitespace) {
    Some((id, tail)) => Ok((id.to_string(), tail.trim())),
    None if !rest.is_empty() => Ok((rest.to_string(), "")),
    None => Err(format!("Usage: {}", cmd.usage)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("list");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "list");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("rm");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "delete");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("inv");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "invalidate");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("port");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "import");
  }

  #[test]
  fn test_parse_list_with_filters() {
    let action = parse("list page=2 limit=5 category=shoes in_stock=true min_price=10")
      .unwrap()
      .unwrap();

    assert_eq!(
      action,
      Action::List {
        page: 2,
        limit: 5,
        filters: vec![
          ("category".to_string(), json!("shoes")),
          ("in_stock".to_string(), json!(true)),
          ("min_price".to_string(), json!(10)),
        ],
      }
    );
  }

  #[test]
  fn test_parse_list_defaults() {
    assert_eq!(
      parse("ls").unwrap(),
      Some(Action::List {
        page: DEFAULT_PAGE,
        limit: DEFAULT_LIMIT,
        filters: vec![],
      })
    );
  }

  #[test]
  fn test_parse_list_rejects_bad_paging() {
    assert!(parse("list page=0").is_err());
    assert!(parse("list limit=ten").is_err());
    assert!(parse("list category").is_err());
  }

  #[test]
  fn test_parse_mutations() {
    assert_eq!(
      parse(r#"create {"name": "Boot"}"#).unwrap(),
      Some(Action::Create(json!({"name": "Boot"})))
    );
    assert_eq!(
      parse(r#"update 42 {"price": 30}"#).unwrap(),
      Some(Action::Update {
        id: "42".to_string(),
        record: json!({"price": 30}),
      })
    );
    assert_eq!(
      parse("delete 42").unwrap(),
      Some(Action::Delete("42".to_string()))
    );
    assert_eq!(
      parse(r#"import [{"name": "a"}, {"name": "b"}]"#).unwrap(),
      Some(Action::Import(vec![json!({"name": "a"}), json!({"name": "b"})]))
    );
  }

  #[test]
  fn test_parse_errors() {
    assert!(parse("create").is_err());
    assert!(parse("create {oops").is_err());
    assert!(parse("update 42").is_err());
    assert!(parse("delete").is_err());
    assert!(parse(r#"import {"name": "a"}"#).is_err());
    assert!(parse("frobnicate").is_err());
  }

  #[test]
  fn test_parse_simple_commands() {
    assert_eq!(parse("   ").unwrap(), None);
    assert_eq!(parse("q").unwrap(), Some(Action::Quit));
    assert_eq!(parse("exit").unwrap(), Some(Action::Quit));
    assert_eq!(parse("refresh").unwrap(), Some(Action::Invalidate));
    assert_eq!(parse("stats").unwrap(), Some(Action::Stats));
    assert_eq!(parse("?").unwrap(), Some(Action::Help));
  }
}
