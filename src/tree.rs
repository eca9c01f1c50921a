use ahash::AHashSet;
use glam::Vec2;

use crate::*;

/// The retained view hierarchy.
///
/// Every view lives in the tree's arena and is addressed through a [`ViewI`]. Views start out detached; [`ViewTree::add_view`] links them under a parent.
/// The tree owns all the bookkeeping: dirty regions, layout flags, and the cached leaf/ancestor lookups.
#[derive(Debug)]
pub struct ViewTree {
    pub(crate) views: Views,
    pub(crate) scale_factor: f32,
}

impl Default for ViewTree {
    fn default() -> Self {
        return ViewTree::new();
    }
}

impl ViewTree {
    pub fn new() -> Self {
        return ViewTree {
            views: Views::new(),
            scale_factor: 1.0,
        };
    }

    /// Creates a standalone view: no parent, no children, fully invalidated and waiting for layout.
    pub fn create_view(&mut self, frame: Rect) -> ViewI {
        return self.views.insert(ViewNode::new(frame, ViewRole::Plain));
    }

    /// Like [`ViewTree::create_view`], but the view is the one [`ViewTree::window`] stops at.
    pub fn create_window_view(&mut self, frame: Rect) -> ViewI {
        return self.views.insert(ViewNode::new(frame, ViewRole::Window));
    }

    pub fn view(&self, view: ViewI) -> &ViewNode {
        return &self.views[view];
    }

    pub fn contains(&self, view: ViewI) -> bool {
        return self.views.contains(view);
    }

    /// Identifies `view` across slot reuse: a view created after a [`ViewTree::destroy`] can get the same [`ViewI`], but never the same serial.
    pub fn serial(&self, view: ViewI) -> Option<u64> {
        return self.views.get(view).map(|node| node.serial);
    }

    pub(crate) fn is_same_view(&self, view: ViewI, serial: u64) -> bool {
        return self.serial(view) == Some(serial);
    }

    pub fn len(&self) -> usize {
        return self.views.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// The framebuffer scale of the window this tree belongs to.
    pub fn scale_factor(&self) -> f32 {
        return self.scale_factor;
    }

    pub fn set_widget(&mut self, view: ViewI, widget: impl Widget + 'static) {
        self.views[view].widget = Some(Box::new(widget));
    }

    pub fn set_tag(&mut self, view: ViewI, tag: Option<Tag>) {
        self.views[view].tag = tag;
    }

    pub fn frame(&self, view: ViewI) -> Rect {
        return self.views[view].frame;
    }

    pub fn bounds(&self, view: ViewI) -> Rect {
        return self.views[view].bounds();
    }

    pub fn superview(&self, view: ViewI) -> Option<ViewI> {
        return self.views[view].superview;
    }

    pub fn subviews(&self, view: ViewI) -> &[ViewI] {
        return &self.views[view].subviews;
    }

    pub fn subview(&self, view: ViewI, index: usize) -> Option<ViewI> {
        return self.views[view].subviews.get(index).copied();
    }

    /// Moves or resizes a view.
    ///
    /// Both the old and the new frame get repainted on the superview, and a size change requests layout.
    pub fn set_frame(&mut self, view: ViewI, frame: Rect) {
        let old_frame = self.views[view].frame;
        if old_frame == frame {
            return;
        }

        self.views[view].frame = frame;

        if old_frame.size != frame.size {
            self.request_layout(view);
        }

        if let Some(superview) = self.views[view].superview {
            self.invalidate(superview, Some(old_frame));
        }
        self.invalidate(view, None);
    }

    /// Attaches `child` as the last subview of `parent`.
    ///
    /// Fails without touching either view if `child` already has a superview, or if the link would create a cycle.
    pub fn add_view(&mut self, parent: ViewI, child: ViewI) -> Result<(), UiError> {
        if !self.contains(parent) {
            return Err(UiError::InvalidTarget(parent));
        }
        if !self.contains(child) {
            return Err(UiError::InvalidTarget(child));
        }
        if self.views[child].superview.is_some() {
            return Err(UiError::AlreadyAttached(child));
        }
        if child == parent || self.superviews(parent).any(|above| above == child) {
            return Err(UiError::WouldCycle(child));
        }

        self.views[child].superview = Some(parent);
        self.views[parent].subviews.push(child);

        self.invalidate_leaf_caches(parent);
        self.invalidate_ancestor_caches(child);

        let child_frame = self.views[child].frame;
        self.invalidate(parent, Some(child_frame));
        self.request_layout(parent);

        return Ok(());
    }

    /// Detaches `view` from its superview. Does nothing if it has none.
    ///
    /// The view and its subtree stay alive and can be added somewhere else.
    pub fn remove_from_superview(&mut self, view: ViewI) {
        let Some(old_superview) = self.views[view].superview.take() else {
            return;
        };

        self.views[old_superview].subviews.retain(|&sub| sub != view);

        self.invalidate_leaf_caches(old_superview);
        self.invalidate_ancestor_caches(view);

        let last_frame = self.views[view].frame;
        self.invalidate(old_superview, Some(last_frame));
        self.request_layout(old_superview);
    }

    /// Detaches `view` and frees it together with its whole subtree.
    ///
    /// Any [`ViewI`] pointing into the subtree is dangling afterwards.
    pub fn destroy(&mut self, view: ViewI) {
        if !self.contains(view) {
            return;
        }
        self.remove_from_superview(view);

        let mut stack = vec![view];
        while let Some(i) = stack.pop() {
            let node = self.views.remove(i);
            stack.extend(node.subviews);
        }
    }

    fn invalidate_leaf_caches(&mut self, view: ViewI) {
        let mut current = Some(view);
        while let Some(i) = current {
            self.views[i].leaf_cache = None;
            current = self.views[i].superview;
        }
    }

    fn invalidate_ancestor_caches(&mut self, view: ViewI) {
        let mut stack = vec![view];
        while let Some(i) = stack.pop() {
            let node = &mut self.views[i];
            node.window_cache = None;
            node.root_cache = None;
            stack.extend_from_slice(&node.subviews);
        }
    }

    /// Marks `region` (in the view's own coordinates, defaulting to its whole bounds) as needing a repaint.
    ///
    /// The region is clipped to the view's bounds and merged into the pending region, which only ever grows until it's taken by a redraw.
    /// The clipped region is forwarded up the superview chain in each ancestor's coordinates, so the window sees every repaint its subviews ask for.
    pub fn invalidate(&mut self, view: ViewI, region: Option<Rect>) {
        let mut current = view;
        let mut region = region;

        loop {
            let node = &mut self.views[current];
            let bounds = node.bounds();
            let clipped = region.unwrap_or(bounds).intersection(&bounds);

            node.invalidated = match node.invalidated {
                Some(existing) => Some(existing.union(&clipped)),
                None => Some(clipped),
            };

            if clipped.is_empty() {
                return;
            }
            let Some(superview) = node.superview else {
                return;
            };

            region = Some(clipped.translated(node.frame.origin));
            current = superview;
        }
    }

    /// Takes the pending region of `view`, leaving it clean.
    pub fn take_invalidated(&mut self, view: ViewI) -> Option<Rect> {
        return self.views[view].invalidated.take();
    }

    pub fn invalidated_region(&self, view: ViewI) -> Option<Rect> {
        return self.views[view].invalidated;
    }

    /// Marks `view` as needing layout.
    ///
    /// If it wasn't already dirty, its whole subtree gets marked too. Subtrees that are already dirty were marked when they became dirty, so they're not walked again.
    pub fn request_layout(&mut self, view: ViewI) {
        let mut stack = vec![view];
        while let Some(i) = stack.pop() {
            let node = &mut self.views[i];
            let was_dirty = node.needs_layout;
            node.needs_layout = true;
            if !was_dirty {
                stack.extend_from_slice(&node.subviews);
            }
        }
    }

    pub fn needs_layout(&self, view: ViewI) -> bool {
        return self.views[view].needs_layout;
    }

    /// Whether `view` or any view below it needs layout.
    pub fn needs_layout_below(&self, view: ViewI) -> bool {
        let mut stack = vec![view];
        while let Some(i) = stack.pop() {
            let node = &self.views[i];
            if node.needs_layout {
                return true;
            }
            stack.extend_from_slice(&node.subviews);
        }
        return false;
    }

    /// Lays out `view`: clears its dirty flag, lets its widget arrange the subviews, then lays out the subviews that need it.
    ///
    /// Without a [`Layoutable`] widget this is only the dirty flag bookkeeping.
    pub fn perform_layout(&mut self, view: ViewI) {
        self.views[view].needs_layout = false;

        if let Some(mut widget) = self.views[view].widget.take() {
            if let Some(layoutable) = widget.as_layoutable() {
                let mut cx = LayoutCx { tree: self, view };
                layoutable.perform_layout(&mut cx);
            }
            if let Some(node) = self.views.get_mut(view) {
                node.widget = Some(widget);
            }
        }

        let subviews = self.views[view].subviews.clone();
        for subview in subviews {
            self.layout_if_needed(subview);
        }
    }

    /// Finds the topmost dirty views in the subtree and lays them out.
    pub fn layout_if_needed(&mut self, view: ViewI) {
        if self.views[view].needs_layout {
            self.perform_layout(view);
            return;
        }
        let subviews = self.views[view].subviews.clone();
        for subview in subviews {
            self.layout_if_needed(subview);
        }
    }

    /// All views without subviews reachable from `view` (including `view` itself if it's a leaf), deepest first.
    ///
    /// Views at the same depth keep the order of a depth-first walk. The result is cached until the structure below `view` changes.
    pub fn leaf_views(&mut self, view: ViewI) -> &[ViewDepth] {
        if self.views[view].leaf_cache.is_none() {
            let fresh = self.leaf_views_uncached(view);
            self.views[view].leaf_cache = Some(fresh);
        }
        return self.views[view].leaf_cache.as_deref().unwrap_or(&[]);
    }

    /// Same as [`ViewTree::leaf_views`], always recomputed.
    pub fn leaf_views_uncached(&self, view: ViewI) -> Vec<ViewDepth> {
        let mut out = Vec::new();
        let mut stack = vec![ViewDepth { view, depth: 1 }];

        while let Some(entry) = stack.pop() {
            let subviews = &self.views[entry.view].subviews;
            if subviews.is_empty() {
                out.push(entry);
            } else {
                // reversed, so that they come off the stack in order
                for &sub in subviews.iter().rev() {
                    stack.push(ViewDepth { view: sub, depth: entry.depth + 1 });
                }
            }
        }

        let mut seen = AHashSet::with_capacity(out.len());
        out.retain(|entry| seen.insert(entry.view));
        out.sort_by(|l, r| r.depth.cmp(&l.depth));
        return out;
    }

    /// The closest view at or above `view` with the [`ViewRole::Window`] role, or the root if there is none.
    pub fn window(&mut self, view: ViewI) -> ViewI {
        if let Some(cached) = self.views[view].window_cache {
            return cached;
        }
        let mut above = view;
        while self.views[above].role != ViewRole::Window {
            match self.views[above].superview {
                Some(superview) => above = superview,
                None => break,
            }
        }
        self.views[view].window_cache = Some(above);
        return above;
    }

    /// The topmost ancestor of `view`, or `view` itself if it's detached.
    pub fn root_view(&mut self, view: ViewI) -> ViewI {
        if let Some(cached) = self.views[view].root_cache {
            return cached;
        }
        let root = self.superviews(view).last().unwrap_or(view);
        self.views[view].root_cache = Some(root);
        return root;
    }

    /// Iterates over the ancestors of `view`, closest first. `view` itself is not included.
    pub fn superviews(&self, view: ViewI) -> Superviews<'_> {
        return Superviews {
            tree: self,
            next: self.views[view].superview,
        };
    }

    /// All views containing `point` (in `view`'s coordinates), starting with `view` itself and going inwards.
    ///
    /// Outer views always come before the views they contain. Siblings come in subview order.
    pub fn views_containing_point(&self, view: ViewI, point: Vec2) -> Vec<ViewI> {
        let mut out = Vec::new();
        self.collect_views_containing_point(view, point, &mut out);
        return out;
    }

    fn collect_views_containing_point(&self, view: ViewI, point: Vec2, out: &mut Vec<ViewI>) {
        let node = &self.views[view];
        if !node.bounds().contains(point) {
            return;
        }
        out.push(view);
        for &sub in &node.subviews {
            let local = point - self.views[sub].frame.origin;
            self.collect_views_containing_point(sub, local, out);
        }
    }

    /// Converts a point in `view`'s coordinates to the root view's coordinates.
    pub fn convert_to_root(&self, view: ViewI, point: Vec2) -> Vec2 {
        let mut out = point;
        let mut below = view;
        while let Some(superview) = self.views[below].superview {
            out += self.views[below].frame.origin;
            below = superview;
        }
        return out;
    }

    /// Converts a point in the root view's coordinates to `view`'s coordinates.
    pub fn convert_from_root(&self, view: ViewI, point: Vec2) -> Vec2 {
        let mut out = point;
        let mut below = view;
        while let Some(superview) = self.views[below].superview {
            out -= self.views[below].frame.origin;
            below = superview;
        }
        return out;
    }

    /// Depth-first search for a view with the given tag, starting at `view` itself.
    pub fn view_with_tag(&self, view: ViewI, tag: Tag) -> Option<ViewI> {
        let node = &self.views[view];
        if node.tag == Some(tag) {
            return Some(view);
        }
        return node.subviews.iter().find_map(|&sub| self.view_with_tag(sub, tag));
    }

    /// Draws `view` and then its subviews. Everything drawn is considered repainted.
    pub fn draw(&mut self, view: ViewI, driver: &mut Driver) {
        let node = &mut self.views[view];
        node.invalidated = None;
        let frame = node.frame;

        let mut redraw_requested = false;
        if let Some(mut widget) = node.widget.take() {
            if let Some(drawable) = widget.as_drawable() {
                let mut cx = DrawCx { driver: &mut *driver, view, frame, redraw_requested: false };
                drawable.draw(&mut cx);
                redraw_requested = cx.redraw_requested;
            }
            self.views[view].widget = Some(widget);
        }

        self.draw_subviews(view, driver);

        if redraw_requested {
            self.invalidate(view, None);
        }
    }

    /// Draws each subview of `view` with the driver's origin moved to the subview's top-left corner.
    pub fn draw_subviews(&mut self, view: ViewI, driver: &mut Driver) {
        let subviews = self.views[view].subviews.clone();
        for subview in subviews {
            let offset = self.views[subview].frame.origin;
            let mut driver = driver.scoped_state(StateMask::ORIGIN);
            let origin = driver.origin();
            driver.set_origin(origin + offset);
            self.draw(subview, &mut driver);
        }
    }
}

pub struct Superviews<'a> {
    tree: &'a ViewTree,
    next: Option<ViewI>,
}

impl Iterator for Superviews<'_> {
    type Item = ViewI;
    fn next(&mut self) -> Option<ViewI> {
        let current = self.next?;
        self.next = self.tree.views[current].superview;
        return Some(current);
    }
}

/// Passed to [`Drawable::draw`].
pub struct DrawCx<'a> {
    pub driver: &'a mut Driver,
    pub view: ViewI,
    pub frame: Rect,
    redraw_requested: bool,
}

impl DrawCx<'_> {
    pub fn bounds(&self) -> Rect {
        return self.frame.with_origin(Vec2::ZERO);
    }

    /// Invalidates the view again once it's drawn.
    ///
    /// The window redraws it within the same present, up to [`MAX_INVALIDATE_LOOPS`] times, and warns if it's still dirty after that.
    /// This is meant for views that need a second pass to settle. To animate, invalidate the view once per tick instead, e.g. from a callback
    /// that [re-posts itself](Context::post) or from [`Context::run_with`].
    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }
}

/// Passed to [`Layoutable::perform_layout`].
pub struct LayoutCx<'a> {
    pub tree: &'a mut ViewTree,
    pub view: ViewI,
}

impl LayoutCx<'_> {
    pub fn bounds(&self) -> Rect {
        return self.tree.bounds(self.view);
    }

    pub fn subviews(&self) -> Vec<ViewI> {
        return self.tree.subviews(self.view).to_vec();
    }

    pub fn set_frame(&mut self, view: ViewI, frame: Rect) {
        self.tree.set_frame(view, frame);
    }
}
