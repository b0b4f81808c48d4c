use anyhow::{Context, Result, bail};
use page_markup_config::Config;
use page_markup_engine::{
    Anchor, MarkupStore, NOTE_EDIT_DEBOUNCE_MS, Page, PromptAction, PromptKind, Session,
    SessionOptions, TextRange, export_text,
};
use std::path::PathBuf;
use std::{env, fs, process};

mod store;

use store::JsonFileStore;

const DEFAULT_STORE_FILE: &str = "page-markup.json";

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        print_usage(&args[0]);
        process::exit(1);
    }
    let page_path = PathBuf::from(&args[1]);
    let url = &args[2];
    let command = args.get(3).map(String::as_str).unwrap_or("show");
    let rest = args.get(4..).unwrap_or(&[]);

    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            log::warn!("ignoring unusable config file: {e}");
            Config::default()
        }
    };
    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE));

    let html = fs::read_to_string(&page_path)
        .with_context(|| format!("reading page {}", page_path.display()))?;
    let mut page = Page::from_html(&html)
        .with_context(|| format!("parsing page {}", page_path.display()))?;

    let mut store = JsonFileStore::new(&store_path);
    let mut session = Session::with_options(url, session_options(&config));
    session.start(&mut page);
    session.pump(&mut page, &mut store, 0);

    match command {
        "show" => {}
        "highlight" => {
            create(&mut session, &mut page, &mut store, PromptAction::Highlight, rest)?
        }
        "underline" => {
            create(&mut session, &mut page, &mut store, PromptAction::Underline, rest)?
        }
        "note" => add_note(&mut session, &mut page, &mut store, rest)?,
        "remove" => remove(&mut session, &mut page, &mut store, rest)?,
        "export" => {
            let markups = store.load(url)?.unwrap_or_default();
            match export_text(url, &markups) {
                Some(text) => println!("{text}"),
                None => println!("No text markups saved for {url}"),
            }
            return Ok(());
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(&args[0]);
            process::exit(1);
        }
    }

    print_state(&page, &session, &store)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <page.html> <url> [command]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  show                 Render saved markups over the page (default)");
    eprintln!("  highlight <text>     Highlight the first occurrence of <text>");
    eprintln!("  underline <text>     Underline the first occurrence of <text>");
    eprintln!("  note <text> [body]   Pin a sticky note at the first occurrence of <text>");
    eprintln!("  remove <text>        Remove the markup overlapping <text>");
    eprintln!("  export               Print the plain-text export of saved markups");
    eprintln!();
    eprintln!("Markups are kept in ./{DEFAULT_STORE_FILE}; set store_path in");
    eprintln!("{} to move them.", Config::config_path().display());
}

fn session_options(config: &Config) -> SessionOptions {
    let mut options = SessionOptions::default();
    if let Some(color) = &config.highlight_color {
        options.highlight_color = color.clone();
    }
    if let Some(color) = &config.underline_color {
        options.underline_color = color.clone();
    }
    options
}

/// Open the selection prompt over the first occurrence of the given text
/// and apply a creation action, exactly as a selection release would.
fn create(
    session: &mut Session,
    page: &mut Page,
    store: &mut JsonFileStore,
    action: PromptAction,
    rest: &[String],
) -> Result<()> {
    let needle = single_arg(rest, "the text to mark")?;
    let selection = find_selection(page, needle)?;
    let kind = match session.open_prompt(page, &selection) {
        Some(prompt) => prompt.kind().clone(),
        None => bail!("there is nothing to mark at {needle:?}"),
    };
    if let PromptKind::Remove(id) = kind {
        bail!("{needle:?} already overlaps markup {id}; remove it first");
    }
    let id = session
        .apply_prompt(page, store, action)
        .context("the markup was not created")?;
    println!("Created {id} over {needle:?}");
    Ok(())
}

fn add_note(
    session: &mut Session,
    page: &mut Page,
    store: &mut JsonFileStore,
    rest: &[String],
) -> Result<()> {
    let (needle, body) = match rest {
        [needle] => (needle.as_str(), ""),
        [needle, body] => (needle.as_str(), body.as_str()),
        _ => bail!("note takes the text to pin to and an optional body"),
    };
    let selection = find_selection(page, needle)?;
    match session.open_prompt(page, &selection) {
        Some(prompt) if prompt.kind() == &PromptKind::Create => {}
        Some(_) => bail!("{needle:?} already overlaps a markup; remove it first"),
        None => bail!("there is nothing to pin a note to at {needle:?}"),
    }
    let id = session
        .apply_prompt(page, store, PromptAction::Note)
        .context("the note was not created")?;
    if !body.is_empty() {
        session.note_input(page, &id, body, 0);
        session.blur_note(page);
        session.pump(page, store, NOTE_EDIT_DEBOUNCE_MS);
    }
    println!("Created note {id} at {needle:?}");
    Ok(())
}

fn remove(
    session: &mut Session,
    page: &mut Page,
    store: &mut JsonFileStore,
    rest: &[String],
) -> Result<()> {
    let needle = single_arg(rest, "the text to unmark")?;
    let selection = find_selection(page, needle)?;
    match session.open_prompt(page, &selection) {
        Some(prompt) if matches!(prompt.kind(), PromptKind::Remove(_)) => {}
        _ => bail!("no markup overlaps {needle:?}"),
    }
    let id = session
        .apply_prompt(page, store, PromptAction::Remove)
        .context("the markup was not removed")?;
    println!("Removed {id}");
    Ok(())
}

fn find_selection(page: &Page, needle: &str) -> Result<TextRange> {
    page.find_text(needle)
        .with_context(|| format!("the page contains no text {needle:?}"))
}

fn single_arg<'a>(rest: &'a [String], what: &str) -> Result<&'a str> {
    match rest {
        [arg] => Ok(arg.as_str()),
        _ => bail!("expected exactly one argument: {what}"),
    }
}

fn print_state(page: &Page, session: &Session, store: &JsonFileStore) -> Result<()> {
    let markups = store.load(session.url())?.unwrap_or_default();
    if markups.is_empty() {
        println!("No markups saved for {}", session.url());
    } else {
        println!("Saved markups for {}:", session.url());
        for markup in markups.iter() {
            let anchored = match &markup.anchor {
                Anchor::Range(anchor) => anchor.decode(page).is_some(),
                Anchor::Note(_) => true,
            };
            let status = if anchored { "anchored" } else { "unanchorable" };
            match markup.effective_color() {
                Some(color) => println!(
                    "  {} {} {color} [{status}] {:?}",
                    markup.kind.as_str(),
                    markup.id,
                    markup.text
                ),
                None => println!(
                    "  {} {} [{status}] {:?}",
                    markup.kind.as_str(),
                    markup.id,
                    markup.text
                ),
            }
        }
    }

    let rects: Vec<_> = session.overlay().rendered_rects().collect();
    let notes: Vec<_> = session.overlay().note_panels().collect();
    println!("Overlay: {} rectangle(s), {} note panel(s)", rects.len(), notes.len());
    for (id, rect) in rects {
        println!(
            "  {id}: x={:.0} y={:.0} w={:.0} h={:.0}",
            rect.x0,
            rect.y0,
            rect.width(),
            rect.height()
        );
    }
    for (id, node) in notes {
        println!("  {id}: {:?}", page.text_content(node));
    }
    Ok(())
}
