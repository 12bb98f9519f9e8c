use std::sync::Arc;

use substack_monitor::client::list_all_categories;
use substack_monitor::models::MonitoringResult;
use substack_monitor::{Auth, Config, Monitor, Repository, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).cloned() else {
        print_usage();
        return Ok(());
    };

    let config = Config::load()?;
    let repository = Repository::new(&config.db_path).await?;

    let auth = config
        .cookies_path
        .as_ref()
        .map(|path| Arc::new(Auth::from_cookie_file(path)));

    let monitor = match auth {
        Some(auth) => Monitor::with_auth(repository, auth),
        None => Monitor::new(repository),
    };

    match command.as_str() {
        "add" => {
            let url = required_arg(&args, 2, "add <url> [name]")?;
            let name = args.get(3).map(String::as_str);
            let newsletter = monitor.add_newsletter(url, name).await?;
            println!("Added newsletter: {} ({})", newsletter.name, newsletter.url);
        }

        "check" => {
            let url = required_arg(&args, 2, "check <url>")?;
            let result = monitor.check_newsletter_updates(url).await?;
            print_result(&result);
        }

        "check-all" => {
            let results = monitor.check_all_newsletters().await?;
            for result in &results {
                print_result(result);
            }
            let total: usize = results.iter().map(|r| r.new_posts.len()).sum();
            println!("\nTotal new posts found: {}", total);
        }

        "stats" => {
            let url = required_arg(&args, 2, "stats <url>")?;
            match monitor.get_newsletter_stats(url).await? {
                Some(stats) => {
                    println!("Statistics for {}:", stats.name);
                    println!("  Total posts: {}", stats.total_posts);
                    println!("  Free posts:  {}", stats.free_posts);
                    println!("  Paid posts:  {}", stats.paid_posts);
                    println!("  Last updated: {}", stats.last_updated);
                    if let Some(latest) = stats.latest_post {
                        println!("  Latest post: {} ({})", latest.title, latest.published_date);
                    }
                }
                None => println!("No stats found for {}", url),
            }
        }

        "categories" => {
            for category in list_all_categories().await? {
                println!("{} ({})", category.name, category.id);
            }
        }

        _ => print_usage(),
    }

    Ok(())
}

fn required_arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("usage: substack-monitor {}", usage).into())
}

fn print_result(result: &MonitoringResult) {
    if result.new_posts.is_empty() {
        println!("{}: no new posts", result.newsletter_name);
        return;
    }

    println!(
        "{}: found {} new post(s)",
        result.newsletter_name,
        result.new_posts.len()
    );
    for post in &result.new_posts {
        println!("  - {}", post.title);
        println!("    URL: {}", post.url);
        println!("    Published: {}", post.published_date);
        println!("    Free: {}", if post.is_free { "Yes" } else { "No" });
    }
}

fn print_usage() {
    println!("Usage: substack-monitor <command>");
    println!();
    println!("Commands:");
    println!("  add <url> [name]   Register a newsletter for monitoring");
    println!("  check <url>        Check one newsletter for new posts");
    println!("  check-all          Check every registered newsletter");
    println!("  stats <url>        Show stored-post statistics");
    println!("  categories         List Substack categories");
}
