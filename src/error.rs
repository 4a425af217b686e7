// cglib-winsys/src/error.rs
//
//! Various errors that methods can produce.

use std::error;
use std::fmt::{self, Display, Formatter};

/// The stage of the windowing pipeline that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connecting to the windowing system or bringing up EGL failed.
    Init,
    /// No usable framebuffer configuration was found, or the GPU context couldn't be created.
    CreateContext,
    /// A native window, surface or scanout buffer couldn't be created for an onscreen, or the
    /// backend doesn't allow another onscreen.
    CreateOnscreen,
    /// Binding the GPU context to a surface failed.
    MakeCurrent,
    /// The renderer constraints or driver choice can't be satisfied by any backend.
    BadConstraint,
}

/// Various errors that methods can produce.
///
/// Every variant carries a short human-readable diagnostic intended for logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Connecting to the windowing system or bringing up EGL failed.
    Init(String),
    /// No usable framebuffer configuration was found, or the GPU context couldn't be created.
    CreateContext(String),
    /// A native window, surface or scanout buffer couldn't be created for an onscreen, or the
    /// backend doesn't allow another onscreen.
    CreateOnscreen(String),
    /// Binding the GPU context to a surface failed.
    MakeCurrent(String),
    /// The renderer constraints or driver choice can't be satisfied by any backend.
    BadConstraint(String),
}

impl Error {
    /// Returns the pipeline stage this error came from.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Init(_) => ErrorKind::Init,
            Error::CreateContext(_) => ErrorKind::CreateContext,
            Error::CreateOnscreen(_) => ErrorKind::CreateOnscreen,
            Error::MakeCurrent(_) => ErrorKind::MakeCurrent,
            Error::BadConstraint(_) => ErrorKind::BadConstraint,
        }
    }

    /// Returns the diagnostic message.
    pub fn message(&self) -> &str {
        match *self {
            Error::Init(ref message) |
            Error::CreateContext(ref message) |
            Error::CreateOnscreen(ref message) |
            Error::MakeCurrent(ref message) |
            Error::BadConstraint(ref message) => message,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let stage = match self.kind() {
            ErrorKind::Init => "initialization failed",
            ErrorKind::CreateContext => "context creation failed",
            ErrorKind::CreateOnscreen => "onscreen creation failed",
            ErrorKind::MakeCurrent => "make current failed",
            ErrorKind::BadConstraint => "unsatisfiable constraint",
        };
        write!(f, "{}: {}", stage, self.message())
    }
}

impl error::Error for Error {}

/// Abstraction of the errors that EGL and the native windowing libraries return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowingApiError {
    /// Miscellaneous error.
    Failed,
    /// EGL: An unrecognized attribute or attribute value was passed in the attribute list.
    BadAttribute,
    /// EGL: An EGLContext argument does not name a valid EGL rendering context.
    BadContext,
    /// EGL: An EGLDisplay argument does not name a valid EGL display connection.
    BadDisplay,
    /// EGL: Arguments are inconsistent (for example, a valid context requires
    /// buffers not supplied by a valid surface).
    BadMatch,
    /// EGL: EGL failed to allocate resources for the requested operation.
    BadAlloc,
    /// EGL: EGL is not initialized, or could not be initialized, for the
    /// specified EGL display connection.
    NotInitialized,
    /// EGL: EGL cannot access a requested resource (for example a context is
    /// bound in another thread).
    BadAccess,
    /// EGL: The current surface of the calling thread is a window, pixel
    /// buffer or pixmap that is no longer valid.
    BadCurrentSurface,
    /// EGL: An EGLSurface argument does not name a valid surface (window,
    /// pixel buffer or pixmap) configured for GL rendering.
    BadSurface,
    /// EGL: One or more argument values are invalid.
    BadParameter,
    /// EGL: A NativePixmapType argument does not refer to a valid native
    /// pixmap.
    BadNativePixmap,
    /// EGL: A NativeWindowType argument does not refer to a valid native
    /// window.
    BadNativeWindow,
    /// EGL: A power management event has occurred. The application must
    /// destroy all contexts and reinitialise OpenGL ES state and objects to
    /// continue rendering.
    ContextLost,
    /// EGL: The EGL configuration is unsupported.
    BadConfig,
    /// The entry point for an advertised extension couldn't be resolved.
    ExtensionUnavailable,
}

impl Display for WindowingApiError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
