use recomer::main as recomer_main;

fn main() {
    recomer_main();
}
