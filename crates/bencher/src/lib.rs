/// Entities below this size are benchmarked as small bodies
const SMALL_LIMIT: usize = 1024;
/// Entities below this size are benchmarked as normal bodies
const NORMAL_LIMIT: usize = 64 * 1024;

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile) -> Self {
        Self { name, group, file }
    }

    /// Creates a case grouped by the size of its response body
    pub fn sized(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::of_size(file.len()), file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn file_name(&self) -> &'static str {
        self.file().file_name
    }
}

/// A response body loaded from the `resources/response` directory.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content_type: &'static str,
    content: &'static [u8],
}

impl TestFile {
    pub const fn new(file_name: &'static str, content_type: &'static str, content: &'static [u8]) -> Self {
        Self { file_name, content_type, content }
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

impl TestGroup {
    pub fn of_size(size: usize) -> Self {
        match size {
            0..SMALL_LIMIT => TestGroup::Small,
            SMALL_LIMIT..NORMAL_LIMIT => TestGroup::Normal,
            _ => TestGroup::Large,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestGroup::Small => "small",
            TestGroup::Normal => "normal",
            TestGroup::Large => "large",
        }
    }
}
