use crate::commands::{self, Action, COMMANDS};
use crate::event::{Event, EventHandler};
use color_eyre::{eyre::eyre, Result};
use listcache::cache::{FetchError, ListPage, ListQuery, Snapshot};
use listcache::config::Config;
use listcache::query::Query;
use listcache::remote::CachedListClient;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const PROMPT: &str = "> ";

/// Interactive shell over the cached list client
pub struct App {
  client: CachedListClient,

  /// Page most recently shown with `list`; kept subscribed so invalidation
  /// refetches it
  view: Option<Query<Value>>,

  /// Data last printed for the view, to report background refreshes once
  rendered: Option<Arc<ListPage<Value>>>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let client = CachedListClient::new(config)?;

    Ok(Self {
      client,
      view: None,
      rendered: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    println!(
      "listcache: {} (type 'help' for commands)",
      self.client.endpoint().base()
    );
    prompt()?;

    while !self.should_quit {
      let Some(event) = events.next().await else {
        break;
      };

      match event {
        Event::Line(line) => {
          self.handle_line(&line).await;
          if !self.should_quit {
            prompt()?;
          }
        }
        Event::Tick => self.poll_view()?,
        Event::Eof => self.should_quit = true,
      }
    }

    Ok(())
  }

  async fn handle_line(&mut self, line: &str) {
    let action = match commands::parse(line) {
      Ok(Some(action)) => action,
      Ok(None) => return,
      Err(msg) => {
        println!("{}", msg);
        return;
      }
    };

    match action {
      Action::List {
        page,
        limit,
        filters,
      } => {
        let mut query = ListQuery::new(page, limit);
        for (name, value) in filters {
          query.set_filter(name, value);
        }
        self.show(query).await;
      }
      Action::Create(record) => {
        report("created", self.client.create(&record).await);
      }
      Action::Update { id, record } => {
        report("updated", self.client.update(&id, &record).await);
      }
      Action::Delete(id) => match self.client.delete(&id).await {
        Ok(()) => println!("deleted {}", id),
        Err(e) => println!("{}", describe_error(&e)),
      },
      Action::Import(records) => {
        report("imported", self.client.bulk_import(&records).await);
      }
      Action::Invalidate => {
        self.client.cache().invalidate_all();
        println!("cache invalidated");
      }
      Action::Stats => {
        let stats = self.client.cache().stats();
        println!(
          "entries: {}  populated: {}  derived: {}  in flight: {}  subscribers: {}",
          stats.entries, stats.populated, stats.derived, stats.in_flight, stats.subscribers
        );
      }
      Action::Help => print_help(),
      Action::Quit => self.should_quit = true,
    }
  }

  /// Replace the watched view with `query` and print it once settled.
  async fn show(&mut self, query: ListQuery) {
    // Unsubscribe the old view first so it is not refetched needlessly
    self.view = None;
    self.rendered = None;

    let view = self.view.insert(self.client.query(query));
    let state = view.settled().await.clone();
    let derived = self.client.cache().superset_of(view.key()).is_some();

    print!("{}", render(&state, derived));
    self.rendered = state.data;
  }

  /// Pick up background changes to the watched view.
  fn poll_view(&mut self) -> Result<()> {
    let Some(view) = self.view.as_mut() else {
      return Ok(());
    };
    if !view.poll() || view.is_loading() {
      return Ok(());
    }

    let state = view.state().clone();
    let unchanged = match (&state.data, &self.rendered) {
      (Some(new), Some(old)) => Arc::ptr_eq(new, old),
      (None, None) => state.error.is_none(),
      _ => false,
    };
    if unchanged {
      return Ok(());
    }

    let derived = self.client.cache().superset_of(view.key()).is_some();
    println!();
    println!("view refreshed ({}):", describe_query(view.params()));
    print!("{}", render(&state, derived));
    self.rendered = state.data;
    prompt()
  }
}

fn prompt() -> Result<()> {
  let mut stdout = std::io::stdout();
  write!(stdout, "{}", PROMPT)
    .and_then(|_| stdout.flush())
    .map_err(|e| eyre!("Failed to write prompt: {}", e))
}

fn report(verb: &str, result: std::result::Result<Value, FetchError>) {
  match result {
    Ok(Value::Null) => println!("{}", verb),
    Ok(value) => println!("{}: {}", verb, value),
    Err(e) => println!("{}", describe_error(&e)),
  }
}

fn describe_error(error: &FetchError) -> String {
  if error.is_plan_not_configured() {
    return "error: no plan is configured for this account yet".to_string();
  }
  match error.status {
    Some(status) => format!("error ({}): {}", status, error),
    None => format!("error: {}", error),
  }
}

fn print_help() {
  for cmd in COMMANDS {
    println!("  {:<44} {}", cmd.usage, cmd.description);
    if !cmd.aliases.is_empty() {
      println!("  {:<44} aliases: {}", "", cmd.aliases.join(", "));
    }
  }
}

/// `page=N limit=N field=value ...`, as typed at the prompt.
fn describe_query(query: &ListQuery) -> String {
  let mut parts = vec![
    format!("page={}", query.page()),
    format!("limit={}", query.limit()),
  ];
  for (name, value) in query.filters() {
    match value {
      Value::String(text) => parts.push(format!("{}={}", name, text)),
      other => parts.push(format!("{}={}", name, other)),
    }
  }
  parts.join(" ")
}

/// Records as JSON lines, then a footer; errors after the data they affect.
fn render(state: &Snapshot<Value>, derived: bool) -> String {
  let mut out = String::new();

  if let Some(page) = &state.data {
    for record in &page.records {
      out.push_str(&record.to_string());
      out.push('\n');
    }
    out.push_str(&format!(
      "-- page {}/{} ({} of {} records){}\n",
      page.page,
      page.total_pages,
      page.len(),
      page.total_count,
      if derived { " from a wider cached page" } else { "" }
    ));
  }

  match (&state.error, &state.data) {
    (Some(e), Some(_)) => {
      out.push_str(&format!("{} (showing cached data)\n", describe_error(e)));
    }
    (Some(e), None) => {
      out.push_str(&describe_error(e));
      out.push('\n');
    }
    (None, None) => out.push_str("no data\n"),
    (None, Some(_)) => {}
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn page() -> Arc<ListPage<Value>> {
    Arc::new(ListPage::new(vec![json!({"id": 1}), json!({"id": 2})], 7, 2, 2))
  }

  #[test]
  fn test_describe_query() {
    let query = ListQuery::new(2, 5)
      .filter("in_stock", true)
      .filter("category", "shoes");
    assert_eq!(
      describe_query(&query),
      "page=2 limit=5 category=shoes in_stock=true"
    );
  }

  #[test]
  fn test_render_page() {
    let state = Snapshot {
      data: Some(page()),
      loading: false,
      error: None,
    };

    assert_eq!(
      render(&state, false),
      "{\"id\":1}\n{\"id\":2}\n-- page 2/4 (2 of 7 records)\n"
    );
    assert!(render(&state, true).contains("from a wider cached page"));
  }

  #[test]
  fn test_render_error_keeps_stale_data() {
    let state = Snapshot {
      data: Some(page()),
      loading: false,
      error: Some(FetchError::with_status(500, "boom")),
    };

    assert!(render(&state, false).ends_with("error (500): boom (showing cached data)\n"));
  }

  #[test]
  fn test_render_without_data() {
    let failed = Snapshot::<Value> {
      data: None,
      loading: false,
      error: Some(FetchError::with_status(403, "forbidden")),
    };
    assert_eq!(
      render(&failed, false),
      "error: no plan is configured for this account yet\n"
    );
    assert_eq!(render(&Snapshot::default(), false), "no data\n");
  }
}
