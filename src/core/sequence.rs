//! Purpose: Lazy, seekable sequence over a remote collection paged by `$top`/`$skip`.
//! Exports: `PagedSequence`, `PageSource`, `Gateway`, `PageLoader`, `Iter`.
//! Role: What every collection query returns; fetches further pages on demand.
//! Invariants: Elements keep arrival order across pages; no reordering or dedup.
//! Invariants: `received` never decreases and is the next `$skip` in endpoint mode.
//! Invariants: A fetch that yields zero rows closes the source for good.
//! Invariants: A failed fetch leaves the sequence exactly as it was, so retrying is safe.
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::materialize::Materializer;
use crate::core::page::{Params, Row, take_items, with_skip};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

const ENDPOINT_PREFIX: &str = "/api/";

/// Issues GET requests against the service and returns the parsed body.
pub trait Gateway: Send + Sync {
    fn get_json(&self, endpoint: &str, params: &Params) -> ApiResult<Value>;
}

/// Produces the next page of raw rows for callback-mode sequences.
///
/// The loader receives the sequence's parameters unchanged and keeps its
/// own offset bookkeeping. An empty page means the collection is exhausted.
pub trait PageLoader: Send {
    fn load_page(&mut self, params: &Params) -> ApiResult<Vec<Row>>;
}

impl<F> PageLoader for F
where
    F: FnMut(&Params) -> ApiResult<Vec<Row>> + Send,
{
    fn load_page(&mut self, params: &Params) -> ApiResult<Vec<Row>> {
        self(params)
    }
}

pub enum PageSource {
    /// Re-request `path` with `$skip` set to the rows received so far.
    Endpoint {
        gateway: Arc<dyn Gateway>,
        path: String,
    },
    Loader(Box<dyn PageLoader>),
    /// No further pages exist.
    Closed,
}

impl PageSource {
    pub fn endpoint(gateway: Arc<dyn Gateway>, path: impl Into<String>) -> Self {
        PageSource::Endpoint {
            gateway,
            path: path.into(),
        }
    }

    pub fn loader(loader: impl PageLoader + 'static) -> Self {
        PageSource::Loader(Box::new(loader))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PageSource::Closed)
    }

    fn validate(&self) -> ApiResult<()> {
        match self {
            PageSource::Endpoint { path, .. } if !path.starts_with(ENDPOINT_PREFIX) => {
                Err(Error::new(ErrorKind::Configuration)
                    .with_message("endpoint source must be a service api path")
                    .with_endpoint(path.clone())
                    .with_hint(format!("Endpoint paths start with {ENDPOINT_PREFIX}.")))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for PageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSource::Endpoint { path, .. } => {
                f.debug_struct("Endpoint").field("path", path).finish()
            }
            PageSource::Loader(_) => f.write_str("Loader(..)"),
            PageSource::Closed => f.write_str("Closed"),
        }
    }
}

pub struct PagedSequence<T> {
    source: PageSource,
    params: Params,
    materializer: Box<dyn Materializer<T>>,
    buffer: Vec<T>,
    received: usize,
    position: usize,
}

impl<T> PagedSequence<T> {
    /// Builds a sequence seeded with the eagerly fetched first page.
    ///
    /// An empty first page closes the source immediately.
    pub fn new<M>(
        source: PageSource,
        params: Params,
        materializer: M,
        initial_rows: Vec<Row>,
    ) -> ApiResult<Self>
    where
        M: Materializer<T> + 'static,
    {
        source.validate()?;
        materializer.validate()?;
        let source = if initial_rows.is_empty() {
            PageSource::Closed
        } else {
            source
        };
        let mut sequence = Self {
            source,
            params,
            materializer: Box::new(materializer),
            buffer: Vec::new(),
            received: 0,
            position: 0,
        };
        let elements = sequence.materialize_all(initial_rows)?;
        sequence.append(elements);
        Ok(sequence)
    }

    /// Materialized elements only; never fetches. The service has no total count.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Rows materialized from the source so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_closed()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buffer
    }

    pub fn first(&self) -> Option<&T> {
        self.buffer.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.last()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.buffer
    }

    pub fn get(&mut self, index: usize) -> ApiResult<&T> {
        if !self.ensure(index)? {
            return Err(out_of_range(index, self.buffer.len()));
        }
        Ok(&self.buffer[index])
    }

    /// Yields the element at the internal position and steps past it.
    ///
    /// Fetches one page when the position has reached the end of the
    /// materialized prefix. The flag reports whether another element may
    /// follow without claiming one exists: an open source may still
    /// answer with an empty page.
    pub fn advance(&mut self) -> ApiResult<Option<(&T, bool)>> {
        if self.position >= self.buffer.len() && !self.source.is_closed() {
            self.fetch_next()?;
        }
        if self.position >= self.buffer.len() {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        let has_more = self.position < self.buffer.len() || !self.source.is_closed();
        Ok(Some((&self.buffer[index], has_more)))
    }

    /// The element `advance` would yield next, fetching if needed.
    pub fn current(&mut self) -> ApiResult<Option<&T>> {
        let index = self.position;
        if !self.ensure(index)? {
            return Ok(None);
        }
        Ok(self.buffer.get(index))
    }

    pub fn seek(&mut self, index: usize) -> ApiResult<()> {
        if !self.ensure(index)? {
            return Err(out_of_range(index, self.buffer.len())
                .with_message(format!("cannot seek to index {index}")));
        }
        self.position = index;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Appends without touching the source or `received`.
    pub fn push(&mut self, elements: impl IntoIterator<Item = T>) {
        self.buffer.extend(elements);
    }

    pub fn pop(&mut self) -> Option<T> {
        let popped = self.buffer.pop();
        self.position = self.position.min(self.buffer.len());
        popped
    }

    /// Fetches until the source closes and returns everything materialized.
    pub fn fetch_all(&mut self) -> ApiResult<&[T]> {
        while !self.source.is_closed() {
            self.fetch_next()?;
        }
        Ok(&self.buffer)
    }

    pub fn iter(&mut self) -> Iter<'_, T>
    where
        T: Clone,
    {
        Iter {
            sequence: self,
            index: 0,
            done: false,
        }
    }

    /// Fetches until `index` is materialized; false once the source closed below it.
    fn ensure(&mut self, index: usize) -> ApiResult<bool> {
        while index >= self.buffer.len() {
            if self.source.is_closed() {
                return Ok(false);
            }
            self.fetch_next()?;
        }
        Ok(true)
    }

    fn fetch_next(&mut self) -> ApiResult<usize> {
        let rows = match &mut self.source {
            PageSource::Closed => return Ok(0),
            PageSource::Endpoint { gateway, path } => {
                let params = with_skip(&self.params, self.received);
                tracing::debug!(endpoint = %path, skip = self.received, "fetching next page");
                let body = gateway.get_json(path, &params)?;
                take_items(body, path)?
            }
            PageSource::Loader(loader) => {
                tracing::debug!(received = self.received, "loading next page");
                loader.load_page(&self.params)?
            }
        };
        if rows.is_empty() {
            tracing::debug!(received = self.received, "source exhausted");
            self.source = PageSource::Closed;
            return Ok(0);
        }
        let elements = self.materialize_all(rows)?;
        let count = elements.len();
        self.append(elements);
        Ok(count)
    }

    fn materialize_all(&self, rows: Vec<Row>) -> ApiResult<Vec<T>> {
        rows.into_iter()
            .map(|row| self.materializer.materialize(row))
            .collect()
    }

    fn append(&mut self, elements: Vec<T>) {
        self.received += elements.len();
        self.buffer.extend(elements);
    }
}

impl<T: fmt::Debug> fmt::Debug for PagedSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedSequence")
            .field("source", &self.source)
            .field("params", &self.params)
            .field("received", &self.received)
            .field("position", &self.position)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Walks a sequence from index 0, fetching as needed.
///
/// Yields clones so the sequence stays usable afterwards. A fetch error is
/// yielded once and ends the iteration.
pub struct Iter<'a, T> {
    sequence: &'a mut PagedSequence<T>,
    index: usize,
    done: bool,
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = ApiResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.sequence.ensure(self.index) {
            Ok(true) => {
                let element = self.sequence.buffer[self.index].clone();
                self.index += 1;
                Some(Ok(element))
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::new(ErrorKind::OutOfRange)
        .with_message(format!("index {index} is past the end of {len} results"))
        .with_index(index)
}

#[cfg(test)]
mod tests {
    use super::{Gateway, PageSource, PagedSequence};
    use crate::core::error::{ApiResult, Error, ErrorKind};
    use crate::core::page::{Params, Row, SKIP, TOP, search_params, take_items};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    const PATH: &str = "/api/Widget";

    struct PagedRows {
        rows: Vec<Value>,
        calls: Mutex<Vec<Params>>,
        fail_next: AtomicBool,
        drop_envelope: AtomicBool,
    }

    impl PagedRows {
        fn new(total: i64) -> Arc<Self> {
            Arc::new(Self {
                rows: (0..total).map(|n| json!({"n": n})).collect(),
                calls: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
                drop_envelope: AtomicBool::new(false),
            })
        }

        fn skips(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("calls")
                .iter()
                .map(|params| params.get(SKIP).cloned().unwrap_or_default())
                .collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("calls").len()
        }
    }

    impl Gateway for PagedRows {
        fn get_json(&self, _endpoint: &str, params: &Params) -> ApiResult<Value> {
            self.calls.lock().expect("calls").push(params.clone());
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::new(ErrorKind::Transport).with_message("connection reset"));
            }
            if self.drop_envelope.swap(false, Ordering::SeqCst) {
                return Ok(json!({"Messages": ["busy"]}));
            }
            let skip: usize = params.get(SKIP).map_or(Ok(0), |s| s.parse()).expect("skip");
            let top: usize = params.get(TOP).expect("top").parse().expect("top");
            let end = (skip + top).min(self.rows.len());
            let page = self.rows.get(skip.min(end)..end).unwrap_or_default().to_vec();
            Ok(json!({ "Items": page }))
        }
    }

    fn number(row: Row) -> ApiResult<i64> {
        row.get("n")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::new(ErrorKind::Protocol).with_message("row has no n"))
    }

    fn search(gateway: &Arc<PagedRows>, page_size: usize) -> PagedSequence<i64> {
        let params = search_params(page_size, "");
        let body = gateway.get_json(PATH, &params).expect("first page");
        let rows = take_items(body, PATH).expect("rows");
        gateway.calls.lock().expect("calls").clear();
        let source = PageSource::endpoint(gateway.clone(), PATH);
        PagedSequence::new(source, params, number, rows).expect("sequence")
    }

    #[test]
    fn advance_walks_every_page_in_order() {
        let gateway = PagedRows::new(10);
        let mut sequence = search(&gateway, 3);
        assert_eq!(sequence.len(), 3);

        let mut seen = Vec::new();
        while let Some((value, _)) = sequence.advance().expect("advance") {
            seen.push(*value);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(sequence.len(), 10);
        assert_eq!(sequence.received(), 10);
        assert!(sequence.is_exhausted());
        assert_eq!(gateway.skips(), vec!["3", "6", "9", "10"]);

        assert!(sequence.advance().expect("advance").is_none());
        assert_eq!(gateway.call_count(), 4);
    }

    #[test]
    fn has_more_turns_false_only_after_exhaustion() {
        let gateway = PagedRows::new(2);
        let mut sequence = search(&gateway, 5);
        let (_, has_more) = sequence.advance().expect("advance").expect("first");
        assert!(has_more);
        let (_, has_more) = sequence.advance().expect("advance").expect("second");
        assert!(has_more);
        assert!(sequence.advance().expect("advance").is_none());
        assert!(sequence.is_exhausted());
    }

    #[test]
    fn get_is_idempotent_for_materialized_indices() {
        let gateway = PagedRows::new(10);
        let mut sequence = search(&gateway, 4);
        assert_eq!(*sequence.get(2).expect("get"), 2);
        assert_eq!(*sequence.get(2).expect("get"), 2);
        assert_eq!(gateway.call_count(), 0);

        assert_eq!(*sequence.get(9).expect("get"), 9);
        assert_eq!(gateway.skips(), vec!["4", "8"]);
    }

    #[test]
    fn get_past_the_end_is_out_of_range() {
        let gateway = PagedRows::new(5);
        let mut sequence = search(&gateway, 4);
        let err = sequence.get(7).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(err.index(), Some(7));
        assert_eq!(sequence.len(), 5);
        assert!(sequence.is_exhausted());
    }

    #[test]
    fn empty_search_is_closed_from_the_start() {
        let gateway = PagedRows::new(0);
        let mut sequence = search(&gateway, 4);
        assert_eq!(sequence.len(), 0);
        assert!(sequence.is_exhausted());
        let err = sequence.get(0).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn failed_fetch_leaves_state_untouched() {
        let gateway = PagedRows::new(6);
        let mut sequence = search(&gateway, 3);
        sequence.seek(2).expect("seek");
        sequence.advance().expect("advance");

        gateway.fail_next.store(true, Ordering::SeqCst);
        let err = sequence.advance().expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.received(), 3);
        assert_eq!(sequence.position(), 3);
        assert!(!sequence.is_exhausted());

        let (value, _) = sequence.advance().expect("retry").expect("value");
        assert_eq!(*value, 3);
        assert_eq!(gateway.skips(), vec!["3", "3"]);
    }

    #[test]
    fn missing_items_envelope_is_protocol_error() {
        let gateway = PagedRows::new(6);
        let mut sequence = search(&gateway, 3);
        gateway.drop_envelope.store(true, Ordering::SeqCst);
        let err = sequence.get(4).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.endpoint(), Some(PATH));
        assert_eq!(sequence.len(), 3);
    }

    #[test]
    fn seek_fetches_up_to_index_and_rejects_unreachable() {
        let gateway = PagedRows::new(5);
        let mut sequence = search(&gateway, 2);
        sequence.seek(3).expect("seek");
        assert_eq!(sequence.position(), 3);
        assert_eq!(*sequence.current().expect("current").expect("value"), 3);

        let err = sequence.seek(5).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(sequence.position(), 3);

        sequence.rewind();
        let (value, _) = sequence.advance().expect("advance").expect("value");
        assert_eq!(*value, 0);
    }

    #[test]
    fn push_and_pop_bypass_the_source() {
        let gateway = PagedRows::new(2);
        let mut sequence = search(&gateway, 5);
        sequence.push([40, 41]);
        assert_eq!(sequence.len(), 4);
        assert_eq!(sequence.received(), 2);
        assert_eq!(sequence.pop(), Some(41));
        assert_eq!(sequence.last(), Some(&40));
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn iter_yields_clones_across_pages() {
        let gateway = PagedRows::new(7);
        let mut sequence = search(&gateway, 3);
        let values: Vec<i64> = sequence.iter().collect::<ApiResult<_>>().expect("values");
        assert_eq!(values, (0..7).collect::<Vec<_>>());
        assert_eq!(sequence.as_slice().len(), 7);
    }

    #[test]
    fn loader_receives_parameters_verbatim() {
        let mut pages: VecDeque<Vec<Row>> = VecDeque::from(vec![
            vec![row(2), row(3)],
            vec![row(4)],
            Vec::new(),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_loader = Arc::clone(&seen);
        let loader = move |params: &Params| -> ApiResult<Vec<Row>> {
            seen_by_loader.lock().expect("seen").push(params.clone());
            Ok(pages.pop_front().unwrap_or_default())
        };
        let mut params = Params::new();
        params.insert("cursor".to_string(), "abc123".to_string());

        let mut sequence: PagedSequence<i64> = PagedSequence::new(
            PageSource::loader(loader),
            params.clone(),
            number,
            vec![row(0), row(1)],
        )
        .expect("sequence");
        let all = sequence.fetch_all().expect("all").to_vec();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
        assert_eq!(*seen.lock().expect("seen"), vec![params.clone(), params.clone(), params]);
    }

    #[test]
    fn endpoint_source_must_be_api_path() {
        let gateway = PagedRows::new(1);
        let source = PageSource::endpoint(gateway, "ItemMaster");
        let err = PagedSequence::<i64>::new(source, Params::new(), number, vec![row(0)])
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn materializer_failure_rejects_construction() {
        let mut bad = Row::new();
        bad.insert("m".to_string(), json!(1));
        let err = PagedSequence::<i64>::new(PageSource::Closed, Params::new(), number, vec![bad])
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    fn row(n: i64) -> Row {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(n));
        row
    }
}
