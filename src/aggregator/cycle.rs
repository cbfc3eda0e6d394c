use chrono::Utc;

use super::IngestError;
use crate::feed::{fetch_feed, normalize_pub_date, FeedItem};
use crate::storage::{Database, InsertOutcome, NewPost};

/// Outcome of one committed ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: i64,
    pub feed_name: String,
    /// Items present in the fetched document
    pub items: usize,
    /// Posts newly written
    pub inserted: usize,
    /// Items whose URL was already stored for this feed
    pub duplicates: usize,
    /// Items stored without a publish time
    pub undated: usize,
    /// Items dropped for having no link
    pub skipped: usize,
}

/// Run one ingestion cycle.
///
/// Selects the least recently fetched feed, stamps it as fetched, fetches and
/// parses it, then inserts every item not already stored for that feed. All of
/// it happens in one transaction: on any error nothing is written, including
/// the stamp, so a feed that failed to fetch is picked again next cycle.
///
/// # Errors
///
/// - [`IngestError::NoFeedsAvailable`] when the store holds no feeds
/// - [`IngestError::Fetch`] when retrieval or parsing fails
/// - [`IngestError::Store`] when a store operation or the commit fails
pub async fn scrape_next_feed(
    db: &Database,
    client: &reqwest::Client,
) -> Result<CycleReport, IngestError> {
    let mut tx = db.begin_ingest().await?;

    let feed = tx
        .select_next_feed_to_fetch()
        .await?
        .ok_or(IngestError::NoFeedsAvailable)?;

    // Never move the cursor backwards, even if the wall clock does
    let now = match feed.last_fetched_at {
        Some(previous) => Utc::now().max(previous),
        None => Utc::now(),
    };
    tx.mark_feed_fetched(feed.id, now).await?;

    tracing::debug!(feed_id = feed.id, url = %feed.url, "Fetching feed");
    let document = fetch_feed(client, &feed.url)
        .await
        .map_err(|source| IngestError::Fetch {
            feed_id: feed.id,
            name: feed.name.clone(),
            url: feed.url.clone(),
            source,
        })?;

    let mut report = CycleReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        items: document.items.len(),
        ..CycleReport::default()
    };

    for item in document.items {
        let Some(post) = new_post(feed.id, item, &mut report) else {
            continue;
        };
        match tx.insert_post(&post).await? {
            InsertOutcome::Inserted(_) => report.inserted += 1,
            InsertOutcome::Duplicate => {
                tracing::debug!(feed_id = feed.id, url = %post.url, "Post already stored");
                report.duplicates += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(report)
}

fn new_post(feed_id: i64, item: FeedItem, report: &mut CycleReport) -> Option<NewPost> {
    if item.link.is_empty() {
        tracing::warn!(feed_id, title = %item.title, "Skipping item without a link");
        report.skipped += 1;
        return None;
    }

    let published_at = match normalize_pub_date(&item.pub_date) {
        Ok(at) => Some(at),
        Err(e) => {
            tracing::warn!(
                feed_id,
                title = %item.title,
                pub_date = %e.raw,
                "Unparseable publish date, storing post without one"
            );
            report.undated += 1;
            None
        }
    };

    Some(NewPost {
        feed_id,
        title: non_empty(item.title),
        url: item.link,
        description: non_empty(item.description),
        published_at,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{build_client, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ONE_ITEM: &str = r#"<rss><channel><title>T</title>
        <item><title>Only</title><link>https://example.com/only</link>
        <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate></item>
    </channel></rss>"#;

    fn client() -> reqwest::Client {
        build_client(DEFAULT_USER_AGENT, DEFAULT_FETCH_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_no_feeds_available() {
        let db = Database::open(":memory:").await.unwrap();
        let result = scrape_next_feed(&db, &client()).await;
        assert!(matches!(result, Err(IngestError::NoFeedsAvailable)));
    }

    #[tokio::test]
    async fn test_cycle_stamps_feed_and_stores_post() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ONE_ITEM))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("T", &format!("{}/feed", mock_server.uri()), user.id)
            .await
            .unwrap();

        let report = scrape_next_feed(&db, &client()).await.unwrap();
        assert_eq!(report.feed_id, feed.id);
        assert_eq!(report.items, 1);
        assert_eq!(report.inserted, 1);

        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some());

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title.as_deref(), Some("Only"));
        assert_eq!(posts[0].description, None);
        assert_eq!(
            posts[0].published_at.map(|at| at.to_rfc3339()).as_deref(),
            Some("2006-01-02T15:04:05+00:00")
        );
    }

    #[tokio::test]
    async fn test_item_without_link_is_skipped() {
        let body = r#"<rss><channel>
            <item><title>No link</title></item>
            <item><title>Linked</title><link>https://example.com/a</link></item>
        </channel></rss>"#;
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        db.create_feed("T", &format!("{}/feed", mock_server.uri()), user.id)
            .await
            .unwrap();

        let report = scrape_next_feed(&db, &client()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(db.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_error_mid_cycle_rolls_back_everything() {
        let body = r#"<rss><channel><title>T</title>
            <item><title>First</title><link>https://example.com/1</link></item>
            <item><title>Second</title><link>https://example.com/2</link></item>
            <item><title>Third</title><link>https://example.com/3</link></item>
        </channel></rss>"#;
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("T", &format!("{}/feed", mock_server.uri()), user.id)
            .await
            .unwrap();

        sqlx::query(
            r#"
            CREATE TRIGGER reject_second_post BEFORE INSERT ON posts
            WHEN NEW.url = 'https://example.com/2'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
        "#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let result = scrape_next_feed(&db, &client()).await;
        assert!(matches!(result, Err(IngestError::Store(_))));

        // The first post and the fetch stamp went down with the cycle
        assert_eq!(db.count_posts().await.unwrap(), 0);
        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(stored.last_fetched_at, None);
    }
}
