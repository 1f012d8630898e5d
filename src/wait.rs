//! Suspending the calling thread until a future can make progress.
//!
//! Every waiting operation in this crate is a future that registers a waker
//! with an [`embassy_sync::signal::Signal`] and is woken by the interrupt
//! handler or by the other side of a channel. Under an async executor those
//! futures are simply awaited. Threads of a preemptive kernel drive them with
//! [`block_on`], which parks the thread through a [`Park`] implementation
//! (typically an RTOS task notification or binary semaphore) so that lower
//! priority threads run while it waits.
//!
//! With the `std` feature, [`block_on_thread`] does the same with
//! `std::thread::park`.

use core::marker::PhantomData;
use core::pin::pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Thread suspension hooks of the host kernel.
///
/// The semantics are those of a per-thread notification count of one:
/// an [`unpark`](Park::unpark) that arrives before [`park`](Park::park)
/// makes the next `park` return immediately.
///
/// # Example
/// ```rust,ignore
/// struct FreeRtos;
///
/// impl towerlink::wait::Park for FreeRtos {
///     fn current() -> usize {
///         unsafe { xTaskGetCurrentTaskHandle() as usize }
///     }
///     fn park() {
///         unsafe { ulTaskNotifyTake(pdTRUE, portMAX_DELAY) };
///     }
///     fn unpark(thread: usize) {
///         unsafe { vTaskNotifyGiveFromISR(thread as TaskHandle_t, core::ptr::null_mut()) };
///     }
/// }
/// ```
pub trait Park: 'static {
    /// Token identifying the calling thread, passed back to [`unpark`](Park::unpark).
    fn current() -> usize;

    /// Suspends the calling thread until it is unparked. May return spuriously.
    fn park();

    /// Resumes `thread`. Must be callable from interrupt context.
    fn unpark(thread: usize);
}

struct ParkWaker<P>(PhantomData<P>);

impl<P: Park> ParkWaker<P> {
    const VTABLE: RawWakerVTable =
        RawWakerVTable::new(Self::clone, Self::wake, Self::wake, Self::drop);

    fn raw(thread: usize) -> RawWaker {
        RawWaker::new(core::ptr::without_provenance(thread), &Self::VTABLE)
    }

    fn clone(data: *const ()) -> RawWaker {
        Self::raw(data.addr())
    }

    fn wake(data: *const ()) {
        P::unpark(data.addr());
    }

    fn drop(_: *const ()) {}

    fn for_current_thread() -> Waker {
        // SAFETY: the data pointer is a plain integer token; every vtable
        // entry is thread-safe as long as `P::unpark` is, which `Park` requires.
        unsafe { Waker::from_raw(Self::raw(P::current())) }
    }
}

/// Runs `fut` to completion on the calling thread, parking it with `P`
/// whenever the future is pending.
///
/// Never call this from an interrupt handler.
pub fn block_on<P: Park, F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = ParkWaker::<P>::for_current_thread();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        P::park();
    }
}

#[cfg(feature = "std")]
struct ThreadWaker(std::thread::Thread);

#[cfg(feature = "std")]
impl std::task::Wake for ThreadWaker {
    fn wake(self: std::sync::Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &std::sync::Arc<Self>) {
        self.0.unpark();
    }
}

#[cfg(feature = "std")]
fn thread_waker() -> Waker {
    Waker::from(std::sync::Arc::new(ThreadWaker(std::thread::current())))
}

/// Runs `fut` to completion, parking the current OS thread while it is pending.
#[cfg(feature = "std")]
pub fn block_on_thread<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = thread_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return output;
        }
        std::thread::park();
    }
}

/// Like [`block_on_thread`], but gives up once `timeout` has elapsed.
///
/// # Returns
/// `None` if the future was still pending at the deadline.
#[cfg(feature = "std")]
pub fn block_on_thread_timeout<F: Future>(
    fut: F,
    timeout: std::time::Duration,
) -> Option<F::Output> {
    let deadline = std::time::Instant::now() + timeout;
    let mut fut = pin!(fut);
    let waker = thread_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
            return Some(output);
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return None;
        }
        std::thread::park_timeout(deadline - now);
    }
}
