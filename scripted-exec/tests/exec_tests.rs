use indoc::indoc;
use pretty_assertions::assert_eq;
use scripted_exec::codes;
use scripted_exec::{ExecManager, ExecOutcome, Stage, Toolchain};
use std::path::Path;

fn has_tool(tool: &str) -> bool {
    if which::which(tool).is_ok() {
        true
    } else {
        eprintln!("skipping: {} not found", tool);
        false
    }
}

fn manager(root: &Path) -> ExecManager {
    ExecManager::new(root.join("exec"), Toolchain::default())
}

fn parse_echo(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

const ECHO_C: &str = indoc! {r#"
    /*---DOC---
    {
      "object": "demo.echo_c",
      "language": "c",
      "summary": "Echoes a JSON object with an added timestamp.",
      "entry": "stdio-json",
      "main": "main",
      "timeout_ms": 2000
    }
    ---END---*/
    #include <stdio.h>
    #include <stdlib.h>
    #include <string.h>
    #include <time.h>
    int main(void){
        char *buf = NULL;
        size_t cap = 0, len = 0;
        int c;
        while((c=fgetc(stdin))!=EOF){
            if(len+1 >= cap){ cap = cap? cap*2 : 1024; buf = (char*)realloc(buf, cap);}
            buf[len++] = (char)c;
        }
        if(!buf){ puts("{}"); return 0; }
        buf[len] = '\0';
        char *last = strrchr(buf, '}');
        if(last){
            time_t t = time(NULL);
            char extra[128];
            snprintf(extra, sizeof(extra), ",\"echoed_by\":\"c\",\"ts\":%ld}", (long)t);
            *last = '\0';
            fputs(buf, stdout);
            fputs(extra, stdout);
        } else {
            fputs(buf, stdout);
        }
        free(buf);
        return 0;
    }
"#};

const ECHO_CPP: &str = indoc! {r#"
    /*---DOC---
    {
      "object": "demo.echo_cpp",
      "language": "cpp",
      "summary": "Echoes a JSON object with an added timestamp.",
      "entry": "stdio-json",
      "timeout_ms": 2000
    }
    ---END---*/
    #include <ctime>
    #include <iostream>
    #include <iterator>
    #include <string>
    int main(){
        std::string in((std::istreambuf_iterator<char>(std::cin)), std::istreambuf_iterator<char>());
        auto pos = in.rfind('}');
        if (pos != std::string::npos){
            in.replace(pos, 1, ",\"echoed_by\":\"cpp\",\"ts\":" + std::to_string(std::time(nullptr)) + "}");
        }
        std::cout << in;
        return 0;
    }
"#};

const ECHO_JAVA: &str = indoc! {r#"
    /*---DOC---
    {
      "object": "demo.echo_java",
      "language": "java",
      "summary": "Echoes a JSON object with an added timestamp.",
      "entry": "stdio-json",
      "main": "Main",
      "timeout_ms": 5000
    }
    ---END---*/
    import java.io.*;
    public class Main {
        public static void main(String[] args) throws Exception {
            StringBuilder sb = new StringBuilder();
            try (BufferedReader br = new BufferedReader(new InputStreamReader(System.in))) {
                String line;
                while ((line = br.readLine()) != null) sb.append(line);
            }
            String in = sb.toString();
            int r = in.lastIndexOf('}');
            if (r >= 0) {
                long ts = System.currentTimeMillis() / 1000;
                in = in.substring(0, r) + ",\"echoed_by\":\"java\",\"ts\":" + ts + "}";
            }
            System.out.print(in);
        }
    }
"#};

const TWICE_C: &str = indoc! {r##"
    /*---DOC---
    {
      "object": "demo.twice",
      "language": "c",
      "summary": "Uses a macro from util.h.",
      "entry": "stdio-json",
      "files": [{"name": "util.h", "content": "#define TWICE(x) ((x) * 2)\n"}]
    }
    ---END---*/
    #include <stdio.h>
    #include "util.h"
    int main(void){ printf("{\"v\":%d}", TWICE(21)); return 0; }
"##};

const TWICE_C_NO_HEADER: &str = indoc! {r#"
    /*---DOC---
    {
      "object": "demo.twice",
      "language": "c",
      "summary": "Uses a macro from util.h, which is missing.",
      "entry": "stdio-json"
    }
    ---END---*/
    #include <stdio.h>
    #include "util.h"
    int main(void){ printf("{\"v\":%d}", TWICE(21)); return 0; }
"#};

const ECHO_PY: &str = indoc! {r#"
    /*---DOC---
    {
      "object": "demo.echo_python",
      "language": "python",
      "summary": "Echoes a JSON object with an added field.",
      "entry": "stdio-json"
    }
    ---END---*/
    import sys, json

    def main():
        data = json.load(sys.stdin)
        data["echoed_by"] = "python"
        json.dump(data, sys.stdout)

    if __name__ == "__main__":
        main()
"#};

#[test]
fn test_missing_doc_is_pure_refusal() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run("int main(void){ return 0; }", "{}");
    assert_eq!(result.exit_code, codes::MISSING_DOC);
    assert_eq!(result.stage, Stage::Gate);
    assert_eq!(result.workdir, None);
    assert_eq!(result.outcome(), ExecOutcome::Refused(codes::MISSING_DOC));
    assert!(!mgr.out_root().exists());
}

#[test]
fn test_gate_codes_create_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let bad_entry = ECHO_C.replace("stdio-json", "argv");
    assert_eq!(mgr.build_and_run(&bad_entry, "{}").exit_code, codes::UNSUPPORTED_ENTRY);

    let bad_lang = ECHO_C.replace("\"language\": \"c\"", "\"language\": \"fortran\"");
    assert_eq!(mgr.build_and_run(&bad_lang, "{}").exit_code, codes::UNKNOWN_LANGUAGE);

    let no_summary = ECHO_C.replace("\"summary\"", "\"synopsis\"");
    assert_eq!(mgr.build_and_run(&no_summary, "{}").exit_code, codes::INVALID_DOC);

    assert!(!mgr.out_root().exists());
    assert!(mgr.manifest().read_entries().unwrap().is_empty());
}

#[test]
fn test_workdir_name_is_deterministic() {
    let mgr = ExecManager::new("/tmp/out", Toolchain::default());
    let a = mgr.workdir_for("demo.echo_c", ECHO_C);
    let b = mgr.workdir_for("demo.echo_c", ECHO_C);
    assert_eq!(a, b);

    let name = a.file_name().unwrap().to_string_lossy().into_owned();
    let hash = name.strip_prefix("demo.echo_c_").unwrap();
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let tweaked = ECHO_C.replacen("return 0;", "return  0;", 1);
    assert_ne!(mgr.workdir_for("demo.echo_c", &tweaked), a);
}

#[test]
fn test_c_echo_end_to_end() {
    if !has_tool("gcc") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run(ECHO_C, r#"{"a":1}"#);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    let out = parse_echo(&result.stdout_text);
    assert_eq!(out["a"], 1);
    assert_eq!(out["echoed_by"], "c");
    assert!(out["ts"].as_i64().is_some_and(|ts| ts > 0), "{}", result.stdout_text);
    assert!(result.is_success());

    let work = result.workdir.clone().unwrap();
    assert_eq!(work, mgr.workdir_for("demo.echo_c", ECHO_C));
    for file in ["stdin.json", "doc.json", "main.c", "a.out", "stdout.json", "stderr.txt"] {
        assert!(work.join(file).exists(), "missing {}", file);
    }
    assert_eq!(result.exe_path, Some(work.join("a.out")));

    // Same source, same work directory, rebuilt.
    let again = mgr.build_and_run(ECHO_C, r#"{"b":2}"#);
    assert_eq!(again.workdir, Some(work));
    let out = parse_echo(&again.stdout_text);
    assert_eq!(out["b"], 2);
    assert!(out["ts"].is_i64());

    let entries = mgr.manifest().read_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].object, "demo.echo_c");
    assert_eq!(entries[0].language, "c");
    assert_eq!(entries[0].summary, "Echoes a JSON object with an added timestamp.");
}

#[test]
fn test_extra_file_is_materialized() {
    if !has_tool("gcc") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run(TWICE_C, "{}");
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    assert_eq!(result.stdout_text, r#"{"v":42}"#);

    let failed = mgr.build_and_run(TWICE_C_NO_HEADER, "{}");
    assert!(failed.exit_code >= codes::C_BUILD_BAND, "got {}", failed.exit_code);
    assert!(failed.exit_code < codes::JAVA_BUILD_BAND);
    assert_eq!(failed.stage, Stage::Build);
    assert!(matches!(failed.outcome(), ExecOutcome::BuildFailed(_)));
    assert!(failed.stderr_text.contains("util.h"));

    // Build failures are still recorded.
    assert_eq!(mgr.manifest().read_entries().unwrap().len(), 2);
}

#[test]
fn test_unresolved_ref_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let toolchain = Toolchain {
        gcc: "no-such-compiler-for-tests".to_string(),
        ..Toolchain::default()
    };
    let mgr = ExecManager::new(dir.path().join("exec"), toolchain);
    let source = TWICE_C.replace(
        r##"{"name": "util.h", "content": "#define TWICE(x) ((x) * 2)\n"}"##,
        r#"{"name": "util.h", "ref": "01.0002"}"#,
    );

    let result = mgr.build_and_run(&source, "{}");
    assert_eq!(result.exit_code, codes::SPAWN_FAILURE);
    assert_eq!(result.outcome(), ExecOutcome::SpawnFailure);

    let work = result.workdir.unwrap();
    assert_eq!(
        std::fs::read_to_string(work.join("util.h")).unwrap(),
        "// unresolved ref: 01.0002\n"
    );
    assert_eq!(mgr.manifest().read_entries().unwrap().len(), 1);
}

#[test]
fn test_python_echo() {
    if !has_tool("python3") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run(ECHO_PY, r#"{"a": 1}"#);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    let out: serde_json::Value = serde_json::from_str(&result.stdout_text).unwrap();
    assert_eq!(out["a"], 1);
    assert_eq!(out["echoed_by"], "python");

    let main_py = std::fs::read_to_string(result.workdir.unwrap().join("main.py")).unwrap();
    assert!(!main_py.contains("---DOC---"));
}

#[test]
fn test_program_exit_code_passes_through() {
    if !has_tool("python3") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());
    let source = ECHO_PY.replace("main()\n", "sys.exit(7)\n");

    let result = mgr.build_and_run(&source, "{}");
    assert_eq!(result.exit_code, 7);
    assert_eq!(result.outcome(), ExecOutcome::ProgramFailed(7));
}

#[test]
fn test_enforced_timeout() {
    if !has_tool("python3") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let toolchain = Toolchain {
        enforce_timeout: true,
        ..Toolchain::default()
    };
    let mgr = ExecManager::new(dir.path().join("exec"), toolchain);
    let source = indoc! {r#"
        /*---DOC---
        {"object": "sleeper", "language": "python", "summary": "Sleeps.",
         "entry": "stdio-json", "timeout_ms": 200}
        ---END---*/
        import time
        time.sleep(10)
    "#};

    let result = mgr.build_and_run(source, "{}");
    assert_eq!(result.exit_code, codes::TIMED_OUT);
    assert_eq!(result.outcome(), ExecOutcome::TimedOut);
}

#[test]
fn test_cpp_echo_and_build_band() {
    if !has_tool("g++") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run(ECHO_CPP, r#"{"a":1}"#);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    let out = parse_echo(&result.stdout_text);
    assert_eq!(out["echoed_by"], "cpp");
    assert!(out["ts"].is_i64());
    assert!(result.workdir.unwrap().join("main.cpp").exists());

    let broken = ECHO_CPP.replace("return 0;", "return 0");
    let failed = mgr.build_and_run(&broken, "{}");
    assert_eq!(failed.stage, Stage::Build);
    assert!(
        (codes::CPP_BUILD_BAND + 1..codes::C_BUILD_BAND).contains(&failed.exit_code),
        "got {}",
        failed.exit_code
    );
    assert!(!failed.stderr_text.is_empty());
}

#[test]
fn test_java_echo_with_classpath_and_build_band() {
    if !has_tool("javac") || !has_tool("java") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path());

    let result = mgr.build_and_run(ECHO_JAVA, r#"{"a":1}"#);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    let out = parse_echo(&result.stdout_text);
    assert_eq!(out["echoed_by"], "java");
    assert!(out["ts"].is_i64());
    assert!(result.workdir.unwrap().join("Main.java").exists());

    // An extra classpath entry is joined after the work directory.
    let lib = dir.path().join("lib");
    std::fs::create_dir_all(&lib).unwrap();
    let with_cp = ECHO_JAVA.replace(
        "\"timeout_ms\": 5000",
        &format!("\"timeout_ms\": 5000, \"build\": {{\"classpath\": \"{}\"}}", lib.display()),
    );
    assert_ne!(with_cp, ECHO_JAVA);
    let result = mgr.build_and_run(&with_cp, r#"{"b":2}"#);
    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr_text);
    assert_eq!(parse_echo(&result.stdout_text)["b"], 2);

    let broken = ECHO_JAVA.replace("System.out.print(in);", "System.out.print(in)");
    let failed = mgr.build_and_run(&broken, "{}");
    assert_eq!(failed.stage, Stage::Build);
    assert!(
        (codes::JAVA_BUILD_BAND + 1..codes::PYTHON_SETUP_BAND).contains(&failed.exit_code),
        "got {}",
        failed.exit_code
    );
    assert!(failed.stderr_text.contains("Main.java"));
}
