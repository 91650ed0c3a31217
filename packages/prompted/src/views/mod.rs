mod index;

pub use index::index_page;

pub(crate) const CSS: &str = r#"
    body { font-family: ui-monospace, monospace; background: #111827; color: #e5e7eb; margin: 0; }
    main { max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
    h1 { font-size: 1.5rem; }
    dl { display: grid; grid-template-columns: 8rem 1fr; gap: 0.5rem 1rem; }
    dt { color: #9ca3af; }
    dd { margin: 0; white-space: pre-wrap; word-break: break-word; }
    form { display: flex; gap: 0.5rem; margin-top: 1.5rem; }
    input[type=text] { flex: 1; padding: 0.4rem; background: #1f2937; color: inherit; border: 1px solid #374151; }
    button { padding: 0.4rem 1rem; background: #2563eb; color: white; border: 0; cursor: pointer; }
    .error { color: #f87171; }
    .muted { color: #6b7280; font-size: 0.875rem; }
"#;
