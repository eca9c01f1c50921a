//! Trellis is a retained-mode 2D graphical user interface toolkit.
//!
//! The interface is a tree of rectangular views. Each view can carry a [`Widget`] that handles events, draws itself, or lays out its subviews.
//! The tree is kept between frames: only views that were [invalidated](ViewTree::invalidate) are redrawn, and only views that [requested layout](ViewTree::request_layout) are laid out again.
//!
//! ## Example
//!
//! ```rust
//! # use trellis::*;
//! # fn main() -> Result<(), UiError> {
//! let platform = HeadlessPlatform::new();
//! let mut cx = Context::new(platform.clone());
//!
//! let id = cx.open_window(WindowConfig { visible: true, ..Default::default() })?;
//! let window = cx.window_mut(id).unwrap();
//! let root = window.root();
//!
//! let tree = window.tree_mut();
//! let button = tree.create_view(Rect::from_xywh(10.0, 10.0, 100.0, 30.0));
//! tree.set_widget(button, DrawFn(|cx: &mut DrawCx<'_>| {
//!     let bounds = cx.bounds();
//!     let _ = cx.driver.draw_quad(None, Quad::rect(bounds).color(Color::BLUE));
//! }));
//! tree.add_view(root, button)?;
//!
//! cx.tick()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Window loop
//!
//! A [`Context`] owns a [`Platform`] and every [`Window`] opened through it. [`Context::run`] ticks until every window is closed:
//! platform input is turned into [`Event`]s, the events are dispatched through each window's tree, and windows with invalidated regions are redrawn.
//!
//! Use [`WinitPlatform`] for real desktop windows. [`HeadlessPlatform`] scripts the input and records what would have been drawn, which is what the tests use.
//!
//! ## Events
//!
//! An event with a target goes to that view first, then to its superviews up to the root.
//! An event without a target goes to every leaf view, deepest first, then upwards the same way.
//! Each view sees a given event at most once. See [`EventDispatch`] for the details.
//!
//! ## Drawing
//!
//! Views draw quads into a [`Driver`], which batches them into as few draw calls as possible and uploads them to the GPU in one go.

mod rect;
pub use rect::*;

mod color;
pub use color::*;

mod nodes;
pub use crate::nodes::ViewI;
pub(crate) use crate::nodes::*;

mod view;
pub use view::*;

mod tree;
pub use tree::*;

mod event;
pub use event::*;

mod event_dispatch;
pub use event_dispatch::*;

mod driver;
pub use driver::*;

mod gpu;
pub use gpu::*;

mod texture;
pub use texture::*;

mod platform;
pub use platform::*;

mod window;
pub use window::*;

mod context;
pub use context::*;

mod headless;
pub use headless::*;

mod wgpu_backend;
pub use wgpu_backend::*;

mod winit_platform;
pub use winit_platform::*;

mod error;
pub use error::*;

pub use winit::event::{ElementState, MouseButton};
pub use winit::keyboard::ModifiersState;

#[cfg(test)]
mod tests;
