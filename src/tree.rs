//! A minimal owned N-ary tree used by both search engines.

/// A node holding one value and an ordered list of owned children.
#[derive(Clone, Debug)]
pub struct TreeNode<T> {
    pub value: T,
    pub children: Vec<TreeNode<T>>,
}

impl<T> TreeNode<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            children: Vec::new(),
        }
    }

    pub fn with_children(value: T, children: Vec<TreeNode<T>>) -> Self {
        Self { value, children }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }

    /// Visit every node depth-first, parents before children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a TreeNode<T>, usize)) {
        self.walk_at(0, f);
    }

    fn walk_at<'a>(&'a self, depth: usize, f: &mut impl FnMut(&'a TreeNode<T>, usize)) {
        f(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_walk_order() {
        let tree = TreeNode::with_children(
            1,
            vec![
                TreeNode::with_children(2, vec![TreeNode::new(3)]),
                TreeNode::new(4),
            ],
        );
        assert_eq!(tree.size(), 4);

        let mut seen = Vec::new();
        tree.walk(&mut |node, depth| seen.push((node.value, depth)));
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 2), (4, 1)]);
    }
}
