//! The search orchestrator. Owns the search state, runs one search at a
//! time on a dedicated worker thread, and mediates the control surface:
//! start, stop, ponder hit, hash resize, last result.
//!
//! Control calls arrive on the caller thread; the worker only ever touches
//! the shared stop flag, the clock, and the result slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use shakmaty::{Color, Position};
use tracing::{debug, error, warn};

use crate::book::OpeningBook;
use crate::config::SearchOptions;
use crate::error::EngineError;
use crate::position::{is_legal, parse_uci_move, uci_string, Game};
use crate::search::{InfoSink, Search};
use crate::time::TimeManager;
use crate::types::{SearchMode, SearchResult};

const LOCK: &str = "engine mutex poisoned";

pub struct Engine {
    options: SearchOptions,
    sink: Arc<dyn InfoSink>,
    book: Option<Arc<dyn OpeningBook>>,

    /// Search state lives here while idle and travels into the worker for
    /// the duration of a search.
    search: Option<Search>,
    worker: Option<JoinHandle<Search>>,

    stop: Arc<AtomicBool>,
    time: Arc<TimeManager>,
    searching: Arc<AtomicBool>,
    /// While set, the worker buffers its result instead of announcing it.
    ponder_pending: Arc<AtomicBool>,
    buffered: Arc<Mutex<Option<SearchResult>>>,
    last_result: Arc<Mutex<Option<SearchResult>>>,

    active_mode: Option<SearchMode>,
    active_side: Color,
    /// The previous move came straight from the book; the next search gets
    /// the unspent time as an extension.
    book_move_played: bool,
}

impl Engine {
    pub fn new(sink: Arc<dyn InfoSink>) -> Result<Self, EngineError> {
        Self::with_options(SearchOptions::default(), sink)
    }

    pub fn with_options(
        options: SearchOptions,
        sink: Arc<dyn InfoSink>,
    ) -> Result<Self, EngineError> {
        options.validate()?;
        let stop = Arc::new(AtomicBool::new(false));
        let time = Arc::new(TimeManager::new(stop.clone()));
        let search = Search::new(options.clone(), stop.clone(), time.clone())?;
        Ok(Self {
            options,
            sink,
            book: None,
            search: Some(search),
            worker: None,
            stop,
            time,
            searching: Arc::new(AtomicBool::new(false)),
            ponder_pending: Arc::new(AtomicBool::new(false)),
            buffered: Arc::new(Mutex::new(None)),
            last_result: Arc::new(Mutex::new(None)),
            active_mode: None,
            active_side: Color::White,
            book_move_played: false,
        })
    }

    pub fn set_book(&mut self, book: Arc<dyn OpeningBook>) {
        self.book = Some(book);
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Change a configuration option by name. Rejected while searching.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if self.is_searching() {
            warn!(name, "setoption ignored: search in progress");
            return Err(EngineError::State("cannot set options while searching".into()));
        }
        self.reap_worker();
        let old_hash = self.options.hash_size_mb;
        self.options.set_option(name, value)?;
        if let Some(search) = self.search.as_mut() {
            search.options = self.options.clone();
            if self.options.hash_size_mb != old_hash {
                search.set_hash_size(self.options.hash_size_mb)?;
                debug!(mb = self.options.hash_size_mb, "transposition table rebuilt");
            }
        }
        Ok(())
    }

    /// Rebuild the transposition table at the given size, dropping contents.
    pub fn set_hash_size(&mut self, mb: usize) -> Result<(), EngineError> {
        if self.is_searching() {
            warn!("set_hash_size ignored: search in progress");
            return Err(EngineError::State("cannot resize hash while searching".into()));
        }
        self.reap_worker();
        self.options.hash_size_mb = mb;
        if let Some(search) = self.search.as_mut() {
            search.set_hash_size(mb)?;
        }
        Ok(())
    }

    /// Forget everything learned from the previous game.
    pub fn new_game(&mut self) {
        if self.is_searching() {
            warn!("new_game ignored: search in progress");
            return;
        }
        self.reap_worker();
        if let Some(search) = self.search.as_mut() {
            search.tt.clear();
        }
        self.book_move_played = false;
    }

    /// Kick off a search on the worker thread. Returns once the worker has
    /// taken ownership of the search state; fails if one is already running.
    pub fn start_search(&mut self, game: &Game, mode: SearchMode) -> Result<(), EngineError> {
        if self.is_searching() {
            warn!("start_search while a search is already running");
            return Err(EngineError::State("search already running".into()));
        }
        self.reap_worker();

        if let Some(list) = &mode.restricted_moves {
            for s in list {
                if parse_uci_move(game.position(), s).is_none() {
                    return Err(EngineError::InvalidPosition(format!(
                        "restricted move '{s}' is not legal here"
                    )));
                }
            }
        }

        let mut mode = mode;
        mode.last_move_from_book = std::mem::take(&mut self.book_move_played);

        // A book hit answers instantly; no search is spawned.
        if self.options.use_book
            && !mode.ponder
            && !mode.infinite
            && mode.restricted_moves.is_none()
            && let Some(book) = &self.book
            && let Some(m) = book.probe(game.position())
        {
            debug!(mv = %uci_string(&m), "book move");
            let mut result = SearchResult::new();
            result.best_move = Some(m);
            *self.last_result.lock().expect(LOCK) = Some(result.clone());
            self.sink.send_result(&result);
            self.book_move_played = true;
            return Ok(());
        }

        let Some(mut search) = self.search.take() else {
            return Err(EngineError::State("search state unavailable".into()));
        };
        search.options = self.options.clone();

        let side = game.position().turn();
        self.stop.store(false, Ordering::SeqCst);
        self.time.arm(&mode, side);
        self.ponder_pending.store(mode.ponder, Ordering::SeqCst);
        *self.buffered.lock().expect(LOCK) = None;
        self.active_mode = Some(mode.clone());
        self.active_side = side;
        self.searching.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = bounded::<()>(1);
        let pos = game.position().clone();
        let keys = game.keys().to_vec();
        let sink = self.sink.clone();
        let searching = self.searching.clone();
        let ponder_pending = self.ponder_pending.clone();
        let buffered = self.buffered.clone();
        let last_result = self.last_result.clone();

        let handle = std::thread::spawn(move || {
            // Rendezvous with start_search: the worker now owns the scratch.
            ready_tx.send(()).ok();

            let mut result = search.run(&pos, &keys, &mode, &*sink);

            if let Some(m) = &result.best_move
                && !is_legal(&pos, m)
            {
                error!(mv = %uci_string(m), "search produced an illegal best move");
                result.valid = false;
            }

            {
                // The delivery decision and the buffer share one lock with
                // ponder_hit, so a result is announced exactly once.
                let mut buf = buffered.lock().expect(LOCK);
                *last_result.lock().expect(LOCK) = Some(result.clone());
                if ponder_pending.load(Ordering::SeqCst) {
                    *buf = Some(result);
                } else {
                    sink.send_result(&result);
                }
            }
            searching.store(false, Ordering::SeqCst);
            search
        });

        ready_rx.recv().ok();
        self.worker = Some(handle);
        Ok(())
    }

    /// Raise the stop flag and wait for the worker to hand the search state
    /// back. Safe to call when nothing is running.
    pub fn stop_search(&mut self) {
        if self.worker.is_none() {
            warn!("stop_search with no active search");
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        self.ponder_pending.store(false, Ordering::SeqCst);
        self.reap_worker();
        self.flush_buffered();
    }

    /// The pondered move was played. A still-running search switches to the
    /// real clock; a finished one releases its buffered result.
    pub fn ponder_hit(&mut self) {
        if !self.ponder_pending.load(Ordering::SeqCst) && self.buffered_empty() {
            warn!("ponder_hit without a ponder search");
            return;
        }
        self.ponder_pending.store(false, Ordering::SeqCst);
        if self.is_searching() {
            if let Some(mode) = &self.active_mode {
                let mut timed = mode.clone();
                timed.ponder = false;
                self.time.arm(&timed, self.active_side);
            }
        } else {
            self.reap_worker();
        }
        self.flush_buffered();
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::SeqCst)
    }

    pub fn last_result(&self) -> Option<SearchResult> {
        self.last_result.lock().expect(LOCK).clone()
    }

    fn buffered_empty(&self) -> bool {
        self.buffered.lock().expect(LOCK).is_none()
    }

    fn flush_buffered(&mut self) {
        if let Some(result) = self.buffered.lock().expect(LOCK).take() {
            self.sink.send_result(&result);
        }
    }

    /// Join a finished worker and recover the search state it carried.
    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(search) => self.search = Some(search),
                Err(_) => {
                    error!("search worker panicked; rebuilding search state");
                    self.searching.store(false, Ordering::SeqCst);
                    self.search =
                        Search::new(self.options.clone(), self.stop.clone(), self.time.clone())
                            .ok();
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::testing::SingleLineBook;
    use crate::search::SearchProgress;
    use shakmaty::Chess;
    use std::time::{Duration, Instant};

    /// Records everything the engine reports.
    #[derive(Default)]
    struct CollectingSink {
        infos: Mutex<Vec<SearchProgress>>,
        results: Mutex<Vec<SearchResult>>,
    }

    impl InfoSink for CollectingSink {
        fn send_info(&self, progress: &SearchProgress) {
            self.infos.lock().unwrap().push(progress.clone());
        }
        fn send_result(&self, result: &SearchResult) {
            self.results.lock().unwrap().push(result.clone());
        }
    }

    fn engine_with_sink() -> (Engine, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let mut options = SearchOptions::default();
        options.hash_size_mb = 1;
        let engine = Engine::with_options(options, sink.clone()).unwrap();
        (engine, sink)
    }

    fn wait_until_idle(engine: &Engine) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while engine.is_searching() {
            assert!(Instant::now() < deadline, "search did not finish in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fixed_depth_search_delivers_result() {
        let (mut engine, sink) = engine_with_sink();
        let game = Game::new();
        engine.start_search(&game, SearchMode::depth(3)).unwrap();
        wait_until_idle(&engine);
        engine.stop_search();

        let result = engine.last_result().expect("result must be published");
        let best = result.best_move.expect("startpos has moves");
        assert!(is_legal(&Chess::default(), &best));
        assert!(result.valid);
        assert_eq!(sink.results.lock().unwrap().len(), 1);
        assert!(!sink.infos.lock().unwrap().is_empty());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (mut engine, _sink) = engine_with_sink();
        let game = Game::new();
        engine.start_search(&game, SearchMode::infinite()).unwrap();
        let err = engine.start_search(&game, SearchMode::depth(2)).unwrap_err();
        assert!(matches!(err, EngineError::State(_)));
        engine.stop_search();
        assert!(!engine.is_searching());
    }

    #[test]
    fn test_stop_without_search_is_ignored() {
        let (mut engine, _sink) = engine_with_sink();
        engine.stop_search();
        assert!(!engine.is_searching());
        assert!(engine.last_result().is_none());
    }

    #[test]
    fn test_stop_during_infinite_search() {
        let (mut engine, _sink) = engine_with_sink();
        let game = Game::new();
        engine.start_search(&game, SearchMode::infinite()).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let stop_issued = Instant::now();
        engine.stop_search();
        assert!(stop_issued.elapsed() < Duration::from_millis(100), "stop must be prompt");
        assert!(!engine.is_searching());
        let result = engine.last_result().unwrap();
        assert!(is_legal(&Chess::default(), &result.best_move.unwrap()));
    }

    #[test]
    fn test_ponder_result_is_held_until_stop() {
        let (mut engine, sink) = engine_with_sink();
        let game = Game::new();
        let mut mode = SearchMode::depth(2);
        mode.ponder = true;
        engine.start_search(&game, mode).unwrap();
        wait_until_idle(&engine);
        // Finished, but nothing may be announced while pondering.
        assert_eq!(sink.results.lock().unwrap().len(), 0);
        engine.stop_search();
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_ponder_hit_flushes_finished_search() {
        let (mut engine, sink) = engine_with_sink();
        let game = Game::new();
        let mut mode = SearchMode::depth(2);
        mode.ponder = true;
        engine.start_search(&game, mode).unwrap();
        wait_until_idle(&engine);
        engine.ponder_hit();
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_book_move_short_circuits_search() {
        let (mut engine, sink) = engine_with_sink();
        let game = Game::new();
        engine.set_book(Arc::new(SingleLineBook::new(game.position(), "e2e4")));
        engine.start_search(&game, SearchMode::depth(6)).unwrap();
        assert!(!engine.is_searching(), "book answers without a worker");
        let result = engine.last_result().unwrap();
        assert_eq!(uci_string(&result.best_move.unwrap()), "e2e4");
        assert_eq!(sink.results.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_restricted_moves_validated() {
        let (mut engine, _sink) = engine_with_sink();
        let game = Game::new();
        let mut mode = SearchMode::depth(2);
        mode.restricted_moves = Some(vec!["e2e5".to_string()]);
        let err = engine.start_search(&game, mode).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPosition(_)));
    }

    #[test]
    fn test_set_option_rejected_mid_search() {
        let (mut engine, _sink) = engine_with_sink();
        let game = Game::new();
        engine.start_search(&game, SearchMode::infinite()).unwrap();
        assert!(engine.set_option("USE_LMR", "off").is_err());
        engine.stop_search();
        assert!(engine.set_option("USE_LMR", "off").is_ok());
    }
}
