use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use attr_scan_core::Record;
use attr_scan_runtime::adapters::page_source::{Cursor, Page, PageError, PageRequest, PageSource};

/// In-memory stand-in for the account service.
///
/// Serves its records by key range with the same cursor rules as the real
/// backend: pages hold at most `page_size` records strictly after the
/// cursor, and an empty page ends the partition.
#[derive(Default)]
pub struct FakeBackend {
    records: BTreeMap<u64, Record>,
    scripted: Mutex<HashMap<usize, VecDeque<PageError>>>,
    failing_after: HashMap<usize, usize>,
    served: Mutex<HashMap<usize, usize>>,
    stalled_after_first_page: HashSet<usize>,
    requests: Mutex<Vec<PageRequest>>,
}

impl FakeBackend {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.key, record))
                .collect(),
            ..Self::default()
        }
    }

    /// Queues errors returned, in order, before `partition` is served normally.
    pub fn script_errors(self, partition: usize, errors: Vec<PageError>) -> Self {
        self.scripted
            .lock()
            .expect("poisoned mutex")
            .insert(partition, errors.into());
        self
    }

    /// Once `pages` pages of `partition` have been served, every further
    /// request for it fails with a transient error.
    pub fn fail_after_pages(mut self, partition: usize, pages: usize) -> Self {
        self.failing_after.insert(partition, pages);
        self
    }

    /// Requests for `partition` past its first page never complete.
    pub fn stall_after_first_page(mut self, partition: usize) -> Self {
        self.stalled_after_first_page.insert(partition);
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().expect("poisoned mutex").clone()
    }

    pub fn requests_for(&self, partition: usize) -> Vec<PageRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.partition == partition)
            .collect()
    }
}

#[async_trait]
impl PageSource for FakeBackend {
    async fn fetch_page(&self, request: PageRequest) -> Result<Page, PageError> {
        self.requests
            .lock()
            .expect("poisoned mutex")
            .push(request.clone());

        let served = self
            .served
            .lock()
            .expect("poisoned mutex")
            .get(&request.partition)
            .copied()
            .unwrap_or(0);
        if self
            .failing_after
            .get(&request.partition)
            .is_some_and(|limit| served >= *limit)
        {
            return Err(PageError::Transient("status 503: service unavailable".to_string()));
        }
        let scripted = self
            .scripted
            .lock()
            .expect("poisoned mutex")
            .get_mut(&request.partition)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        if request.cursor.is_some() && self.stalled_after_first_page.contains(&request.partition) {
            std::future::pending::<()>().await;
        }

        let start = match &request.cursor {
            Some(cursor) => {
                let after: u64 = cursor
                    .as_str()
                    .parse()
                    .map_err(|_| PageError::Malformed(format!("bad cursor {cursor}")))?;
                after.saturating_add(1)
            }
            None => request.range.start,
        };
        if start > request.range.end {
            return Ok(Page {
                records: Vec::new(),
                next: None,
            });
        }

        let records: Vec<Record> = self
            .records
            .range(start..=request.range.end)
            .take(request.page_size)
            .map(|(_, record)| record.clone())
            .collect();
        let next = records
            .last()
            .map(|record| Cursor::new(record.key.to_string()));
        *self
            .served
            .lock()
            .expect("poisoned mutex")
            .entry(request.partition)
            .or_default() += 1;
        Ok(Page { records, next })
    }
}
