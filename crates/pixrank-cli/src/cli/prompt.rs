use anyhow::Result;
use dialoguer::{Input, Password};
use pixrank::services::Metric;

/// Operations offered by the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Insert,
    Extract,
    Query,
    BatchQuery,
    Exit,
}

impl std::str::FromStr for MenuChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(MenuChoice::Insert),
            "2" => Ok(MenuChoice::Extract),
            "3" => Ok(MenuChoice::Query),
            "4" => Ok(MenuChoice::BatchQuery),
            "5" => Ok(MenuChoice::Exit),
            other => Err(format!("'{}' is not a menu option", other)),
        }
    }
}

/// Accepts y/n in either case
pub fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_top_n(input: &str) -> Result<usize, String> {
    match input.trim().parse::<usize>() {
        Ok(0) => Err("enter a number greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a whole number", input.trim())),
    }
}

/// Comma-separated queries, blanks dropped
pub fn parse_query_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn ask_text(prompt: &str) -> Result<String> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(value.trim().to_string())
}

pub fn ask_secret(prompt: &str) -> Result<String> {
    Ok(Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?)
}

/// Ask until `parse` accepts the answer
fn ask_parsed<T, F>(prompt: &str, parse: F) -> Result<T>
where
    F: Fn(&str) -> Result<T, String>,
{
    loop {
        match parse(&ask_text(prompt)?) {
            Ok(value) => return Ok(value),
            Err(message) => println!("Invalid input: {}. Please try again.", message),
        }
    }
}

pub fn ask_menu_choice() -> Result<MenuChoice> {
    ask_parsed("Enter choice (1/2/3/4/5)", |s| s.parse())
}

pub fn ask_yes_no(prompt: &str) -> Result<bool> {
    ask_parsed(prompt, |s| {
        parse_yes_no(s).ok_or_else(|| "please enter 'y' or 'n'".to_string())
    })
}

pub fn ask_metric() -> Result<Metric> {
    ask_parsed("Similarity metric (1 = cosine_similarity, 2 = euclidean)", |s| {
        s.parse::<Metric>().map_err(|e| e.to_string())
    })
}

pub fn ask_top_n() -> Result<usize> {
    ask_parsed("How many top results do you want to show", parse_top_n)
}

pub fn pause() -> Result<()> {
    ask_text("Press Enter to continue...")?;
    Ok(())
}
