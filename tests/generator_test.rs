use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;
use tmplgen::{Context, Error, Generator, GeneratorOptions};

struct Fixture {
    _root: TempDir,
    project: PathBuf,
    templates: PathBuf,
}

fn fixture(manifest: &str, templates: &[(&str, &str)]) -> Fixture {
    let root = TempDir::new().unwrap();
    let project = root.path().join("project");
    let template_dir = root.path().join("templates");
    fs::create_dir_all(&project).unwrap();
    fs::create_dir_all(&template_dir).unwrap();
    fs::write(project.join("project.toml"), manifest).unwrap();
    for (name, content) in templates {
        let path = template_dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    Fixture { _root: root, project, templates: template_dir }
}

fn demo() -> Fixture {
    fixture("name = \"demo\"\n", &[("greeting.tmpl", "Hello {{name}}!")])
}

#[test_log::test]
fn test_generator_initialization() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    assert_eq!(generator.project_path(), fixture.project.as_path());
    assert_eq!(generator.template_path(), fixture.templates.as_path());
    assert!(!generator.is_closed());
}

#[test]
fn test_invalid_paths() {
    let fixture = demo();
    let missing = fixture.project.join("missing");

    let result = Generator::new(&missing, &fixture.templates);
    assert!(matches!(result, Err(Error::InvalidPath { .. })));

    let result = Generator::new(&fixture.project, &missing);
    assert!(matches!(result, Err(Error::InvalidPath { .. })));

    let file = fixture.project.join("project.toml");
    let result = Generator::new(&fixture.project, &file);
    assert!(matches!(result, Err(Error::InvalidPath { .. })));
}

#[test_log::test]
fn test_generate_greeting() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    let written = generator.generate_file("greeting.tmpl", "out/greeting.txt").unwrap();

    assert_eq!(written, fixture.project.join("out/greeting.txt"));
    assert_eq!(fs::read_to_string(&written).unwrap(), "Hello demo!");
}

#[test]
fn test_generate_absolute_destination() {
    let fixture = demo();
    let output = TempDir::new().unwrap();
    let target = output.path().join("nested/dir/greeting.txt");
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    generator.generate_file("greeting.tmpl", &target).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "Hello demo!");
}

#[test]
fn test_unbound_placeholder_creates_nothing() {
    let fixture = fixture("name = \"demo\"\n", &[("greeting.tmpl", "Hello {{missing}}!")]);
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    match generator.generate_file("greeting.tmpl", "out/greeting.txt") {
        Err(Error::UnboundPlaceholder { key, .. }) => assert_eq!(key, "missing"),
        other => panic!("Expected UnboundPlaceholder, got {:?}", other),
    }
    assert!(!fixture.project.join("out/greeting.txt").exists());
    assert!(!fixture.project.join("out").exists());
}

#[test]
fn test_failed_render_keeps_existing_destination() {
    let fixture = fixture(
        "name = \"demo\"\n",
        &[("good.tmpl", "Hello {{name}}!"), ("bad.tmpl", "Bye {{missing}}!")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    generator.generate_file("good.tmpl", "out.txt").unwrap();
    assert!(generator.generate_file("bad.tmpl", "out.txt").is_err());

    assert_eq!(fs::read_to_string(fixture.project.join("out.txt")).unwrap(), "Hello demo!");
    // Still usable after a failure.
    generator.generate_file("good.tmpl", "again.txt").unwrap();
}

#[test]
fn test_existing_file_is_overwritten() {
    let fixture = demo();
    let target = fixture.project.join("greeting.txt");
    fs::write(&target, "a much longer previous content that must disappear").unwrap();

    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();
    generator.generate_file("greeting.tmpl", &target).unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "Hello demo!");
}

#[test]
fn test_generate_is_deterministic() {
    let fixture = fixture(
        "name = \"demo\"\nversion = \"1.2.3\"\n[author]\nname = \"dev\"\n",
        &[("info.tmpl", "{{ name }} {{ version }} by {{ author.name }}\n")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    generator.generate_file("info.tmpl", "first.txt").unwrap();
    generator.generate_file("info.tmpl", "second.txt").unwrap();

    let first = fs::read(fixture.project.join("first.txt")).unwrap();
    let second = fs::read(fixture.project.join("second.txt")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, b"demo 1.2.3 by dev\n");
}

#[test]
fn test_traversal_rejected() {
    let fixture = demo();
    fs::write(fixture.project.join("secret.txt"), "secret").unwrap();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    let result = generator.generate_file("../project/secret.txt", "leak.txt");
    assert!(matches!(result, Err(Error::Traversal { .. })));
    assert!(!fixture.project.join("leak.txt").exists());
}

#[test]
fn test_template_not_found() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    let result = generator.generate_file("src/file.a", "dst/file.b");
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert!(!fixture.project.join("dst").exists());
}

#[test]
fn test_invalid_project_is_lazy() {
    let fixture = demo();
    fs::remove_file(fixture.project.join("project.toml")).unwrap();

    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();
    let result = generator.generate_file("greeting.tmpl", "out.txt");
    assert!(matches!(result, Err(Error::InvalidProject { .. })));

    // A failed resolution is not cached.
    fs::write(fixture.project.join("project.toml"), "name = \"late\"\n").unwrap();
    generator.generate_file("greeting.tmpl", "out.txt").unwrap();
    assert_eq!(fs::read_to_string(fixture.project.join("out.txt")).unwrap(), "Hello late!");
}

#[test]
fn test_eager_context() {
    let fixture = demo();
    let options = GeneratorOptions { eager_context: true, ..GeneratorOptions::default() };
    fs::remove_file(fixture.project.join("project.toml")).unwrap();

    let result = Generator::with_options(&fixture.project, &fixture.templates, options);
    assert!(matches!(result, Err(Error::InvalidProject { .. })));
}

#[test]
fn test_context_is_stable_for_the_session() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    generator.generate_file("greeting.tmpl", "a.txt").unwrap();
    fs::write(fixture.project.join("project.toml"), "name = \"changed\"\n").unwrap();
    generator.generate_file("greeting.tmpl", "b.txt").unwrap();

    assert_eq!(fs::read_to_string(fixture.project.join("b.txt")).unwrap(), "Hello demo!");
    assert_eq!(generator.context().unwrap().get("name"), Some(&serde_json::json!("demo")));
}

#[test]
fn test_generate_with_extra_context() {
    let fixture = fixture(
        "name = \"demo\"\n",
        &[("greeting.tmpl", "Hello {{ name }} from {{ city }}!")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    let mut extra = Context::new();
    extra.insert("city", "Baku");
    generator.generate_file_with("greeting.tmpl", "out.txt", &extra).unwrap();
    assert_eq!(
        fs::read_to_string(fixture.project.join("out.txt")).unwrap(),
        "Hello demo from Baku!"
    );

    // The overlay does not leak into later calls.
    let result = generator.generate_file("greeting.tmpl", "out2.txt");
    assert!(matches!(result, Err(Error::UnboundPlaceholder { .. })));
}

#[test]
fn test_render_and_templates() {
    let fixture = fixture(
        "name = \"demo-app\"\n",
        &[("a.tmpl", "{{ name_snake_case }}"), ("dir/b.tmpl", "{{ name | kebab_case }}")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    assert_eq!(generator.templates().unwrap(), vec!["a.tmpl", "dir/b.tmpl"]);
    assert_eq!(generator.render("a.tmpl").unwrap(), "demo_app");
    assert_eq!(generator.render("dir/b.tmpl").unwrap(), "demo-app");
}

#[test]
fn test_new_then_close() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    generator.close();
    assert!(generator.is_closed());
}

#[test]
fn test_close_is_idempotent() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();
    generator.generate_file("greeting.tmpl", "out.txt").unwrap();

    generator.close();
    generator.close();
    assert!(generator.is_closed());
}

#[test]
fn test_use_after_close() {
    let fixture = demo();
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();
    generator.close();

    let result = generator.generate_file("greeting.tmpl", "out.txt");
    assert!(matches!(result, Err(Error::UseAfterClose)));
    assert!(matches!(generator.context(), Err(Error::UseAfterClose)));
    assert!(!fixture.project.join("out.txt").exists());
}

#[test]
fn test_concurrent_generation() {
    let fixture = demo();
    let generator = Arc::new(Generator::new(&fixture.project, &fixture.templates).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || generator.generate_file("greeting.tmpl", format!("out/{}.txt", i)))
        })
        .collect();

    for handle in handles {
        let written = handle.join().unwrap().unwrap();
        assert_eq!(fs::read_to_string(written).unwrap(), "Hello demo!");
    }
}

#[test]
fn test_first_use_resolves_context_once() {
    let fixture = demo();
    let generator = Arc::new(Generator::new(&fixture.project, &fixture.templates).unwrap());
    let barrier = Arc::new(Barrier::new(9));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = Arc::clone(&generator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                generator.generate_file("greeting.tmpl", format!("race/{}.txt", i))
            })
        })
        .collect();

    // Swap the manifest while the workers race for the first resolution.
    let staged = fixture.project.join("project.toml.new");
    fs::write(&staged, "name = \"swapped\"\n").unwrap();
    barrier.wait();
    fs::rename(&staged, fixture.project.join("project.toml")).unwrap();

    let outputs: Vec<String> = handles
        .into_iter()
        .map(|handle| fs::read_to_string(handle.join().unwrap().unwrap()).unwrap())
        .collect();

    let context = generator.context().unwrap();
    let expected = format!("Hello {}!", context.get("name").unwrap().as_str().unwrap());
    assert!(expected == "Hello demo!" || expected == "Hello swapped!");
    assert!(outputs.iter().all(|output| *output == expected));
}

#[test]
fn test_unbound_placeholder_in_include_creates_nothing() {
    let fixture = fixture(
        "name = \"demo\"\n",
        &[("main.tmpl", "{% include 'part.tmpl' %}"), ("part.tmpl", "Hi {{ missing }}")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    match generator.generate_file("main.tmpl", "out.txt") {
        Err(Error::UnboundPlaceholder { key, .. }) => assert_eq!(key, "missing"),
        other => panic!("Expected UnboundPlaceholder, got {:?}", other),
    }
    assert!(!fixture.project.join("out.txt").exists());
}

#[test]
fn test_toml_date_renders_as_text() {
    let fixture = fixture(
        "name = \"demo\"\ncreated = 2024-01-02\n",
        &[("date.tmpl", "{{ name }} {{ created }}")],
    );
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();

    assert_eq!(generator.render("date.tmpl").unwrap(), "demo 2024-01-02");
}

#[test]
fn test_independent_generators() {
    let first = demo();
    let second = fixture("name = \"other\"\n", &[("greeting.tmpl", "Hi {{name}}")]);

    let a = Generator::new(&first.project, &first.templates).unwrap();
    let b = Generator::new(&second.project, &second.templates).unwrap();

    assert_eq!(a.render("greeting.tmpl").unwrap(), "Hello demo!");
    assert_eq!(b.render("greeting.tmpl").unwrap(), "Hi other");

    a.close();
    assert_eq!(b.render("greeting.tmpl").unwrap(), "Hi other");
}

#[test]
fn test_keep_trailing_newline_option() {
    let fixture = fixture("msg = \"Hello World!\"\n", &[("render_ok.txt", "{{ msg }}\n")]);
    let generator = Generator::new(&fixture.project, &fixture.templates).unwrap();
    assert_eq!(generator.render("render_ok.txt").unwrap(), "Hello World!\n");

    let options = GeneratorOptions { keep_trailing_newline: false, ..GeneratorOptions::default() };
    let generator = Generator::with_options(&fixture.project, &fixture.templates, options).unwrap();
    assert_eq!(generator.render("render_ok.txt").unwrap(), "Hello World!");
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_generator_is_send_sync() {
    assert_send_sync::<Generator>();
}
