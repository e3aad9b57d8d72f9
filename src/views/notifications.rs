use tokio::sync::Mutex;

use crate::api::{keys, Api};
use crate::cache::{Observer, QueryEntry};
use crate::error::Error;
use crate::model::{Message, Notification};
use crate::mutation::{Identities, Mutation};
use crate::query::{QueryFn, QueryRunner};

/// Controller of the notification list
pub struct Notifications {
    queries: QueryRunner,
    fetch: QueryFn,
    observer: Mutex<Option<Observer>>,
    read: Mutation<String, Message>,
}

impl Notifications {
    pub(crate) fn new(queries: QueryRunner, identities: Identities, api: &Api) -> Self {
        let read = {
            let api = api.clone();
            Mutation::new(
                "read-notification",
                queries.clone(),
                identities,
                move |id: String| {
                    let api = api.clone();
                    async move { api.read_notification(&id).await }
                },
            )
            .invalidates(|_, _| vec![keys::notifications().into()])
        };

        Self {
            queries,
            fetch: api.notifications_fn(),
            observer: Mutex::new(None),
            read,
        }
    }

    pub async fn open(&self) -> QueryEntry {
        let key = keys::notifications();
        {
            let mut observer = self.observer.lock().await;
            if observer.is_none() {
                *observer = Some(self.queries.cache().observe(&key, self.fetch.clone()).await);
            }
        }
        self.queries.run(&key, &self.fetch).await
    }

    pub async fn entry(&self) -> QueryEntry {
        let key = keys::notifications();
        self.queries
            .cache()
            .get(&key)
            .await
            .unwrap_or_else(|| QueryEntry::new(key))
    }

    /// Notifications not read yet, newest first
    pub async fn unread(&self) -> Vec<Notification> {
        let mut unread: Vec<Notification> = self
            .entry()
            .await
            .data_as::<Vec<Notification>>()
            .ok()
            .flatten()
            .unwrap_or_default()
            .into_iter()
            .filter(|n| !n.is_read)
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread
    }

    /// Mark the notification as read
    pub async fn read(&self, id: &str) -> Result<Message, Error> {
        self.read.run(id.to_string()).await
    }
}
