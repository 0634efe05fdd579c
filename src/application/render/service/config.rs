use comrak::options::Options;

/// Parser options for the supported markdown dialect: CommonMark plus the GFM
/// extensions and dollar-delimited math.
pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.math_dollars = true;
    ext.math_code = false;
    ext.footnotes = false;
    ext.description_lists = false;
    ext.superscript = false;
    ext.front_matter_delimiter = None;

    // Output is produced by our own serializer; comrak never formats HTML.
    options.render.sourcepos = false;
}
